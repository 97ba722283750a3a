use locdb::{Database, Network};
use serde_json::{json, Value};

/// Render a matched network together with its resolved AS and country
pub fn network_to_json(db: &Database, network: &Network) -> anyhow::Result<Value> {
    let mut value = json!({
        "network": network.to_string(),
        "prefix_len": network.prefix_len(),
        "country_code": network.country_code(),
        "asn": if network.asn() == 0 { None } else { Some(network.asn()) },
        "flags": network.flags().codes(),
    });

    if network.asn() != 0 {
        if let Some(system) = db.get_as(network.asn())? {
            value["as_name"] = json!(system.name);
        }
    }
    if let Some(code) = network.country_code() {
        if let Some(country) = db.get_country(code)? {
            value["country_name"] = json!(country.name);
            value["continent_code"] = json!(country.continent_code);
        }
    }

    Ok(value)
}

/// One-line human rendering of a network
pub fn describe_network(db: &Database, network: &Network) -> anyhow::Result<String> {
    let mut parts = vec![network.to_string()];

    if let Some(code) = network.country_code() {
        match db.get_country(code)? {
            Some(country) if !country.name.is_empty() => {
                parts.push(format!("{} ({})", code, country.name))
            }
            _ => parts.push(code.to_string()),
        }
    }
    if network.asn() != 0 {
        match db.get_as(network.asn())? {
            Some(system) => parts.push(system.to_string()),
            None => parts.push(format!("AS{}", network.asn())),
        }
    }
    if !network.flags().is_empty() {
        parts.push(format!("[{}]", network.flags()));
    }

    Ok(parts.join("  "))
}

/// Format a Unix timestamp as `YYYY-MM-DD HH:MM:SS UTC`
pub fn format_unix_timestamp(timestamp: u64) -> String {
    let days = timestamp / 86400;
    let remaining = timestamp % 86400;
    let (year, month, day) = days_to_ymd(days);

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        year,
        month,
        day,
        remaining / 3600,
        (remaining % 3600) / 60,
        remaining % 60
    )
}

// Days since 1970-01-01 to a civil date
fn days_to_ymd(days: u64) -> (u64, u64, u64) {
    let mut year = 1970;
    let mut remaining_days = days;

    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let month_lengths = [
        31,
        if is_leap_year(year) { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];

    let mut month = 1;
    for length in month_lengths {
        if remaining_days < length {
            break;
        }
        remaining_days -= length;
        month += 1;
    }

    (year, month, remaining_days + 1)
}

fn is_leap_year(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
