use chrono::SecondsFormat;
use owo_colors::OwoColorize;
use tally_core::model::{Datum, MetricRecord};

pub fn print_datums_human(datums: &[Datum]) {
    for d in datums {
        let dims = d
            .dimensions
            .iter()
            .map(|dim| format!("{}={}", dim.name, dim.value))
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{} {} {} [{}]",
            d.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            d.metric_name.cyan(),
            d.value,
            dims
        );
    }
    println!("-- {} datums --", datums.len());
}

pub fn print_datums_json(datums: &[Datum]) -> anyhow::Result<()> {
    for d in datums {
        println!("{}", serde_json::to_string(d)?);
    }
    Ok(())
}

/// Routed outputs send whole records, so show them as they go on the wire.
pub fn print_routed_human(records: &[(Option<&str>, String)]) {
    for (key, line) in records {
        println!("{} {}", key.unwrap_or("-").yellow(), line);
    }
    println!("-- {} records --", records.len());
}

pub fn print_records_json(records: &[MetricRecord]) -> anyhow::Result<()> {
    for r in records {
        println!("{}", serde_json::to_string(r)?);
    }
    Ok(())
}
