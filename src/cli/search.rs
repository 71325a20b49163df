use anyhow::{Context, Result};
use std::path::Path;

use sounding::config::SoundingConfig;
use sounding::records::query::parse_top_n;
use sounding::records::types::MetadataValue;
use sounding::QueryFilter;

/// Options for `sounding search`.
pub struct SearchArgs<'a> {
    pub records: &'a Path,
    pub query: &'a str,
    pub top_n: Option<i64>,
    pub conditions: &'a [String],
    pub json: bool,
}

/// Load a records file, embed it, and print the best matches for a query.
pub async fn search(config: &SoundingConfig, args: SearchArgs<'_>) -> Result<()> {
    let top_n = match args.top_n {
        Some(n) => parse_top_n(n)?,
        None => config.default_top_n()?,
    };
    let filter = parse_filter(args.conditions)?;

    let records = super::load_records(args.records)?;
    let engine = super::build_engine(config)?;
    let report = engine.ingest_batch(records).await;
    for (id, err) in report.failed() {
        eprintln!("warning: record {id} is not searchable: {err}");
    }

    let result = engine
        .query_filtered(args.query, top_n, &filter)
        .await
        .context("query failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.views())?);
        return Ok(());
    }

    if result.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!(
        "Top {} of {} candidate(s)\n",
        result.len(),
        result.candidates
    );

    for view in result.views() {
        let preview = if view.text.chars().count() > 120 {
            format!("{}...", view.text.chars().take(120).collect::<String>())
        } else {
            view.text.to_string()
        };
        let score = match view.score {
            Some(s) => format!("{s:.4}"),
            None => "n/a".to_string(),
        };

        println!("  {}. {} (score: {})", view.rank, view.id, score);
        println!("     {}", preview);
        if !view.metadata.is_empty() {
            let fields: Vec<String> = view
                .metadata
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            println!("     {}", fields.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Parse `field=value` pairs into equality conditions.
fn parse_filter(conditions: &[String]) -> Result<QueryFilter> {
    conditions.iter().try_fold(QueryFilter::new(), |filter, raw| {
        let (field, value) = raw
            .split_once('=')
            .with_context(|| format!("invalid --where condition (expected field=value): {raw}"))?;
        anyhow::ensure!(!field.trim().is_empty(), "empty field name in --where: {raw}");
        Ok(filter.eq(field.trim(), MetadataValue::parse_literal(value.trim())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_filter_accepts_pairs() {
        let filter = parse_filter(&["region=north".into(), "depth=10".into()]).unwrap();
        assert_eq!(filter.conditions().len(), 2);
    }

    #[test]
    fn parse_filter_rejects_missing_equals() {
        assert!(parse_filter(&["region".into()]).is_err());
        assert!(parse_filter(&["=north".into()]).is_err());
    }
}
