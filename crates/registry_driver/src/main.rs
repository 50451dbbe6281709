use registry_driver::init;

fn main() {
    if let Err(e) = init() {
        eprintln!("❌ registry-driver failed: {e}");
        std::process::exit(1);
    }
}
