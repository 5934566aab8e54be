fn main() {
    println!("cargo:rerun-if-changed=devices.json");

    // The ESP-IDF environment is only needed for firmware builds; host
    // builds and tests run without it.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
