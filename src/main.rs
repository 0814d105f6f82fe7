use pg_wire_emulator::app::{self, init_config, init_logging, run_server};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = app::parse();

    let config = init_config(&args)?;

    if args.test_config {
        println!("Configuration file \"{}\" is valid", args.config_file);
        return Ok(());
    }

    init_logging(&args)?;

    run_server(args, config)
}
