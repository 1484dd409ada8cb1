use rustc_version::{version_meta, Channel};

/// Expose the compiler release channel as a cfg flag so the docs can
/// turn on `doc_auto_cfg` on nightly
fn main() {
    for channel in ["NIGHTLY", "BETA", "DEV", "STABLE"] {
        println!("cargo::rustc-check-cfg=cfg(CHANNEL_{channel})");
    }
    let channel = match version_meta().map(|meta| meta.channel) {
        Ok(Channel::Nightly) => "CHANNEL_NIGHTLY",
        Ok(Channel::Beta) => "CHANNEL_BETA",
        Ok(Channel::Dev) => "CHANNEL_DEV",
        Ok(Channel::Stable) | Err(_) => "CHANNEL_STABLE",
    };
    println!("cargo:rustc-cfg={channel}");
}
