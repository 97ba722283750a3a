use anyhow::{Context, Result};
use clap::Args;
use locdb::country::CONTINENT_CODES;
use locdb::{file_reader, signature, NetworkFlags, Writer};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Args)]
pub struct BuildArgs {
    /// Networks feed: network,country,asn,flags
    #[arg(long, value_name = "CSV")]
    networks: Vec<PathBuf>,

    /// Autonomous systems feed: asn,name
    #[arg(long, value_name = "CSV")]
    ases: Vec<PathBuf>,

    /// Countries feed: code,continent,name
    #[arg(long, value_name = "CSV")]
    countries: Vec<PathBuf>,

    /// Output database path
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Sign the database with this PEM encoded Ed25519 private key
    #[arg(long, value_name = "PEM")]
    signing_key: Option<PathBuf>,

    /// Vendor string stored in the header
    #[arg(long, default_value = "")]
    vendor: String,

    /// Description stored in the header
    #[arg(long, default_value = "")]
    description: String,

    /// License stored in the header
    #[arg(long, default_value = "")]
    license: String,

    /// Mark the database as expired this many days after creation
    #[arg(long, value_name = "DAYS")]
    expires_in_days: Option<u64>,

    /// Print build statistics as JSON
    #[arg(short, long)]
    json: bool,
}

pub fn cmd_build(args: BuildArgs) -> Result<()> {
    if args.networks.is_empty() && args.ases.is_empty() && args.countries.is_empty() {
        anyhow::bail!("Nothing to build: pass at least one of --networks, --ases, --countries");
    }

    let mut writer = Writer::new();
    writer.set_metadata(args.vendor, args.description, args.license);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    writer.set_created_at(now);
    if let Some(days) = args.expires_in_days {
        writer.set_expires_at(now.saturating_add(days.saturating_mul(86400)));
    }

    if let Some(path) = &args.signing_key {
        let key = signature::load_signing_key(path)
            .with_context(|| format!("Failed to load signing key: {}", path.display()))?;
        writer.set_signing_key(Some(key));
    }

    for path in &args.countries {
        let count = import_countries(&mut writer, path)?;
        info!("{}: {} countries", path.display(), count);
    }
    for path in &args.ases {
        let count = import_ases(&mut writer, path)?;
        info!("{}: {} autonomous systems", path.display(), count);
    }
    for path in &args.networks {
        let count = import_networks(&mut writer, path)?;
        info!("{}: {} networks", path.display(), count);
    }

    let stats = writer
        .write(&args.output)
        .with_context(|| format!("Failed to write database: {}", args.output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Wrote {}", args.output.display());
        println!(
            "  Networks:  {} ({} after deduplication)",
            stats.networks_added, stats.networks_written
        );
        println!("  Nodes:     {}", stats.nodes_written);
        println!("  ASes:      {}", stats.autonomous_systems);
        println!("  Countries: {}", stats.countries);
        println!("  Size:      {} bytes", stats.bytes);
        println!("  Signed:    {}", if stats.signed { "yes" } else { "no" });
    }

    Ok(())
}

fn csv_reader(path: &Path) -> Result<csv::Reader<Box<dyn std::io::BufRead + Send>>> {
    let input = file_reader::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;

    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(input))
}

fn import_networks(writer: &mut Writer, path: &Path) -> Result<usize> {
    let mut reader = csv_reader(path)?;
    let mut count = 0;

    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
        match add_network_row(writer, &record) {
            Ok(()) => count += 1,
            Err(e) => warn!("{}:{}: skipping row: {}", path.display(), line_of(&record), e),
        }
    }

    Ok(count)
}

fn add_network_row(writer: &mut Writer, record: &csv::StringRecord) -> Result<()> {
    let prefix = record.get(0).unwrap_or_default();
    let country = record.get(1).unwrap_or_default();
    let asn = match record.get(2).unwrap_or_default() {
        "" => 0,
        text => text
            .trim_start_matches("AS")
            .parse::<u32>()
            .with_context(|| format!("invalid AS number '{}'", text))?,
    };

    let mut flags = NetworkFlags::NONE;
    for code in record.get(3).unwrap_or_default().split('|') {
        let code = code.trim();
        if code.is_empty() {
            continue;
        }
        flags |= NetworkFlags::from_code(code)
            .with_context(|| format!("unknown flag '{}'", code))?;
    }

    // Build the record before touching the writer so a bad row leaves no trace
    let mut network: locdb::Network = prefix.parse()?;
    network.set_country_code(country)?;
    network.set_asn(asn);
    network.set_flags(flags);
    writer.insert_network(network);

    Ok(())
}

fn import_ases(writer: &mut Writer, path: &Path) -> Result<usize> {
    let mut reader = csv_reader(path)?;
    let mut count = 0;

    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
        let number = record
            .get(0)
            .unwrap_or_default()
            .trim_start_matches("AS")
            .parse::<u32>();
        let name = record.get(1).unwrap_or_default();

        match number {
            Ok(number) => match writer.add_as(number) {
                Ok(system) => {
                    system.set_name(name);
                    count += 1;
                }
                Err(e) => warn!("{}:{}: skipping row: {}", path.display(), line_of(&record), e),
            },
            Err(e) => warn!("{}:{}: skipping row: {}", path.display(), line_of(&record), e),
        }
    }

    Ok(count)
}

fn import_countries(writer: &mut Writer, path: &Path) -> Result<usize> {
    let mut reader = csv_reader(path)?;
    let mut count = 0;

    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
        let code = record.get(0).unwrap_or_default();
        let continent = record.get(1).unwrap_or_default();
        let name = record.get(2).unwrap_or_default();

        let continent_known = CONTINENT_CODES.contains(&continent.to_ascii_uppercase().as_str());
        if !continent.is_empty() && !continent_known {
            warn!(
                "{}:{}: skipping row: unknown continent code '{}'",
                path.display(),
                line_of(&record),
                continent
            );
            continue;
        }

        let result = writer.add_country(code).and_then(|country| {
            country.set_continent_code(continent)?;
            country.set_name(name);
            Ok(())
        });
        match result {
            Ok(()) => count += 1,
            Err(e) => warn!("{}:{}: skipping row: {}", path.display(), line_of(&record), e),
        }
    }

    Ok(count)
}

fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}
