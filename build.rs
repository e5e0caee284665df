fn main() {
    // ESP-IDF link arguments are only needed when the MQTT adapter for the
    // real target is compiled in.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
