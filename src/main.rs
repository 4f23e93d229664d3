mod cli;

fn main() -> anyhow::Result<()> {
    fingerpick::logging::init();
    cli::run()
}
