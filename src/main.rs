use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    jamchat::cli::main()
}
