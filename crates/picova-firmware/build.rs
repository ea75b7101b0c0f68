//! Bakes the optional `.env` overrides into the firmware image.

/// Variables forwarded from `.env` (or the build environment) to the
/// compiler as `option_env!` values.
const OVERRIDES: [&str; 2] = ["PICOVA_SHUNT_OHMS", "PICOVA_SENSOR_ADDRESS"];

fn main() {
    println!("cargo:rerun-if-changed=.env");

    // No .env means no overrides; the defaults in picova-core apply
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            println!("cargo:warning=ignoring unreadable .env: {e}");
        }
    }

    for key in OVERRIDES {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
