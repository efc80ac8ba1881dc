// Build script to compile the built-in GLSL shaders to SPIR-V

use std::path::Path;
use std::process::Command;

const SHADER_DIR: &str = "assets/shaders";
const SHADERS: [&str; 2] = ["Builtin.ObjectShader.vert", "Builtin.ObjectShader.frag"];

fn main() {
    println!("cargo:rerun-if-changed={}", SHADER_DIR);

    // Compile shaders using glslc (part of Vulkan SDK)
    for shader in SHADERS {
        let input = Path::new(SHADER_DIR).join(shader);
        let output = Path::new(SHADER_DIR).join(format!("{}.spv", shader));
        compile_shader(&input, &output);
    }
}

fn compile_shader(input: &Path, output: &Path) {
    println!("cargo:rerun-if-changed={}", input.display());

    let result = Command::new("glslc").arg(input).arg("-o").arg(output).status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input.display(), output.display());
        }
        Ok(status) => {
            println!(
                "cargo:warning=Failed to compile {}: exit code {:?}",
                input.display(),
                status.code()
            );
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), shaders were not compiled", e);
            println!(
                "cargo:warning=Install the Vulkan SDK or compile manually: glslc {} -o {}",
                input.display(),
                output.display()
            );
        }
    }
}
