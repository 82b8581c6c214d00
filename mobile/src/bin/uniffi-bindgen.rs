// Kotlin/Swift binding generator for the mobile library:
//   cargo run --bin uniffi-bindgen generate --library <libdnsvisor_mobile.so> --language kotlin --out-dir <dir>
fn main() {
    uniffi::uniffi_bindgen_main()
}
