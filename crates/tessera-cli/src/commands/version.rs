//! Version command.

/// Prints version information.
pub fn run() {
    println!("tessera {}", env!("CARGO_PKG_VERSION"));
    println!("main edition: {}", tessera::MAIN_EDITION);
}
