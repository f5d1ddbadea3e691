// 构建脚本: 链接FFmpeg依赖库
fn main() {
    // 未启用FFmpeg后端时无需额外链接
    if std::env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }

    // 仅在Windows MSVC环境下添加FFmpeg相关库
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = std::env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();
    if target_os == "windows" && target_env == "msvc" {
        // dshow 摄像头采集
        println!("cargo:rustc-link-lib=dylib=strmiids");

        // OLE 自动化和VFW
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // Secure Channel (RTSP over TLS)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
