fn main() {
    // Export ESP-IDF link arguments when building for the device target.
    // Host builds (unit/integration tests) skip the embuild hook entirely.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
