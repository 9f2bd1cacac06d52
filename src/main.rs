use std::path::PathBuf;

use addr2field::{debug, session, LocateOptions, Outcome, TargetMode, DEFAULT_HEADER_SIZE};
use anyhow::{Context, Result};
use clap::Parser;

/// Resolve a raw data address to the fully qualified field that occupies it.
#[derive(Parser, Debug)]
#[command(name = "addr2field", version)]
struct Cli {
    /// Binary with DWARF debug info (ELF, Mach-O, PE)
    binary: PathBuf,

    /// Target address in hex, with or without the 0x prefix
    #[arg(value_parser = parse_hex_address)]
    address: u64,

    /// Treat ADDRESS as an offset into the data section holding the variable
    #[arg(long = "section-relative", default_value_t = false)]
    section_relative: bool,

    /// Maximum nesting depth followed while walking types
    #[arg(long = "max-depth", default_value_t = addr2field::DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Length of the .debug_addr header preceding the address entries.
    /// Standard DWARF 5 tables use 8; the default of 12 matches toolchains that pad the header.
    #[arg(long = "addr-header-size", default_value_t = DEFAULT_HEADER_SIZE)]
    addr_header_size: usize,

    /// Print the result as a JSON document
    #[arg(long = "json", default_value_t = false)]
    json: bool,

    /// Enable debug output
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,
}

impl Cli {
    fn options(&self) -> LocateOptions {
        LocateOptions {
            mode: if self.section_relative {
                TargetMode::SectionRelative
            } else {
                TargetMode::Absolute
            },
            max_depth: self.max_depth,
            addr_header_size: self.addr_header_size,
        }
    }
}

fn parse_hex_address(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let hex_str = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(hex_str, 16).map_err(|e| format!("invalid hex address '{}': {}", input, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = debug::init_logger(cli.debug).context("failed to start logger")?;

    if !cli.json {
        println!("Looking for target address: 0x{:x}", cli.address);
    }

    let report = session::run(&cli.binary, cli.address, &cli.options())
        .with_context(|| format!("cannot analyze {}", cli.binary.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
        return Ok(());
    }

    for section in &report.sections {
        println!(
            "Loaded section {}: [0x{:x}, 0x{:x}), {} bytes",
            section.name,
            section.start,
            section.end,
            section.size()
        );
    }
    let header = &report.address_table_header;
    println!(
        "Loaded .debug_addr (version {}, address size {}) with {} entries.",
        header.version, header.address_size, report.address_table_entries
    );

    match &report.outcome {
        Outcome::Found(found) => println!(
            "Fully Qualified Field Name: {}, In Variable of Size: {}",
            found.path, found.variable_size
        ),
        Outcome::Exhausted => {
            println!(
                "Target address 0x{:x} not found in any global variable.",
                report.target
            );
            if let Some(hint) = &report.symbol_hint {
                println!("({})", hint);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_address_forms() {
        assert_eq!(parse_hex_address("0x1006"), Ok(0x1006));
        assert_eq!(parse_hex_address("1006"), Ok(0x1006));
        assert_eq!(parse_hex_address(" 0X20000010 "), Ok(0x2000_0010));
        assert!(parse_hex_address("0xzz").is_err());
        assert!(parse_hex_address("").is_err());
    }

    #[test]
    fn cli_maps_to_options() {
        let cli = Cli::parse_from([
            "addr2field",
            "--section-relative",
            "--addr-header-size",
            "8",
            "fw.elf",
            "0x16",
        ]);
        let options = cli.options();
        assert_eq!(cli.address, 0x16);
        assert_eq!(options.mode, TargetMode::SectionRelative);
        assert_eq!(options.addr_header_size, 8);
        assert_eq!(options.max_depth, addr2field::DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
