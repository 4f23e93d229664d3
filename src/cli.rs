use anyhow::{Context, Result, anyhow};
use pico_args::Arguments;
use std::{env, fs, path::PathBuf};

use fingerpick::{config::PickerConfig, input, replay};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // Options first; pico-args consumes free args in order.
    let config_path: Option<PathBuf> = pargs.opt_value_from_str("--config")?;
    let until_ms: Option<u64> = pargs.opt_value_from_str("--until")?;

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            match topic {
                Some(t) => print_subcmd_help(&t),
                None => print_help(),
            }
            Ok(())
        }

        Some("replay") => {
            let script: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: fingerpick replay <script.jsonl> [--until <ms>]"))?;
            let cfg = PickerConfig::resolve(config_path.as_deref())?;
            let text = fs::read_to_string(&script)
                .with_context(|| format!("failed to read {}", script.display()))?;
            let steps = replay::parse_script(&text)
                .with_context(|| format!("bad script {}", script.display()))?;
            for frame in replay::run(&cfg, &steps, until_ms)? {
                println!("{}", serde_json::to_string(&frame)?);
            }
            Ok(())
        }

        Some("watch") => {
            let cfg = PickerConfig::resolve(config_path.as_deref())?;
            input::watch(&cfg).context("watch failed")
        }

        Some("config") => {
            let cfg = PickerConfig::resolve(config_path.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }

        Some("devices") => {
            let devices = input::discover_multitouch();
            if devices.is_empty() {
                println!("no multitouch devices found (are you in the 'input' group?)");
            }
            for d in devices {
                println!("{}\t{}", d.path, d.name);
            }
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        r#"fingerpick — pick one finger at random

USAGE:
  fingerpick help [command]                  Show general or command-specific help
  fingerpick replay <script> [--until <ms>]  Replay a JSON-lines touch script
  fingerpick watch                           Pick from live multitouch devices
  fingerpick config                          Print the effective configuration
  fingerpick devices                         List detected multitouch devices

OPTIONS:
  --config <path>   Use this config instead of ~/.config/fingerpick/config.toml

Logging follows RUST_LOG (default: fingerpick=info).
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "replay" => println!(
            "usage: fingerpick replay <script.jsonl> [--until <ms>] [--config <path>]\n\
             Runs the script on a virtual clock and prints one JSON frame per step\n\
             and per timer firing. --until keeps the clock running after the last step."
        ),
        "watch" => println!(
            "usage: fingerpick watch [--config <path>]\nFeeds every multitouch device into the picker until Ctrl-C."
        ),
        "config" => println!(
            "usage: fingerpick config [--config <path>]\nPrints the configuration after defaults are applied."
        ),
        "devices" => println!("usage: fingerpick devices\nLists /dev/input devices with multitouch axes."),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}
