use std::env;
use std::path::Path;
use std::process::Command;

// The engine loads any redirect object by path; this one is compiled so the
// client has a default and the privileged test has something to attach.
// A missing clang is not a build failure, `ProgramSpec::bundled` is then None.
fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let src_path = Path::new("redirect").join("client_xdp.c");
    let dest_path = Path::new(&out_dir).join("client_xdp.o");

    println!("cargo:rerun-if-changed={}", src_path.to_string_lossy());

    let built = Command::new("clang")
        .arg("-O2")
        .arg("-g")
        .arg("-target")
        .arg("bpf")
        .arg("-c")
        .arg(&src_path)
        .arg("-o")
        .arg(&dest_path)
        .status()
        .map(|status| status.success())
        .unwrap_or(false);

    if built {
        println!("cargo:rustc-env=XDP_REDIRECT_OBJ={}", dest_path.to_string_lossy());
    } else {
        println!("cargo:warning=clang -target bpf failed, redirect program not built");
        println!("cargo:rustc-env=XDP_REDIRECT_OBJ=");
    }
}
