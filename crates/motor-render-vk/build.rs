// SPDX-License-Identifier: CEPL-1.0
use std::{env, fs, path::{Path, PathBuf}};

// Triangle positions and colors are indexed by gl_VertexIndex; no vertex
// buffers. Winding is clockwise in Vulkan's y-down clip space.
const VS_SRC: &str = r#"
#version 450

const vec2 POSITIONS[3] = vec2[](
    vec2( 0.0, -0.5),
    vec2( 0.5,  0.5),
    vec2(-0.5,  0.5)
);

const vec3 COLORS[3] = vec3[](
    vec3(1.0, 0.0, 0.0),
    vec3(0.0, 1.0, 0.0),
    vec3(0.0, 0.0, 1.0)
);

layout(location = 0) out vec3 vColor;

void main() {
    gl_Position = vec4(POSITIONS[gl_VertexIndex], 0.0, 1.0);
    vColor = COLORS[gl_VertexIndex];
}
"#;

const FS_SRC: &str = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(vColor, 1.0);
}
"#;

fn compile(
    comp: &shaderc::Compiler,
    opts: &shaderc::CompileOptions,
    src: &str,
    kind: shaderc::ShaderKind,
    name: &str,
    out: &Path,
) {
    let spv = comp
        .compile_into_spirv(src, kind, name, "main", Some(opts))
        .unwrap_or_else(|e| panic!("{name}: {e}"));
    fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())
        .unwrap_or_else(|e| panic!("writing {name}.spv: {e}"));
}

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_1 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    compile(&comp, &opts, VS_SRC, shaderc::ShaderKind::Vertex, "tri.vert", &out);
    compile(&comp, &opts, FS_SRC, shaderc::ShaderKind::Fragment, "tri.frag", &out);

    println!("cargo:rerun-if-changed=build.rs");
}
