fn main() {
    // CoreBluetooth refuses to scan from a bare binary unless an Info.plist
    // carrying NSBluetoothAlwaysUsageDescription is linked into the
    // __TEXT,__info_plist section. Keyed on the target OS, not the host.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("macos") {
        return;
    }

    let manifest_dir =
        std::env::var("CARGO_MANIFEST_DIR").expect("cargo always sets CARGO_MANIFEST_DIR");
    let plist = format!("{manifest_dir}/Info.plist");

    for arg in ["-sectcreate", "__TEXT", "__info_plist", plist.as_str()] {
        println!("cargo:rustc-link-arg={arg}");
    }
    println!("cargo:rerun-if-changed=Info.plist");
}
