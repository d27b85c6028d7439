use paramql::config::AppConfig;
use paramql::logic::parse_and_build_query;
use paramql::seed;
use paramql::store::Store;

/// Run a query-string against the demo music catalog:
///
///   paramql Album 'artist.name=Aerosmith&order_by=year-DESC&limit=5'
fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new().filter_level(LevelFilter::Info).init();

    let config = AppConfig::load()?;

    let mut args = std::env::args().skip(1);
    let (root_type, query_string) = match (args.next(), args.next()) {
        (Some(root), Some(qs)) => (root, qs),
        _ => {
            eprintln!("usage: paramql <entity-type> <query-string>");
            eprintln!("  e.g. paramql Album 'artist.name=Aerosmith&order_by=year-DESC'");
            std::process::exit(2);
        }
    };

    let params = split_query_string(&query_string);
    let schema = seed::demo_schema();
    let whitelist = seed::demo_whitelist();
    let store = seed::demo_store();

    let plan = parse_and_build_query(
        &root_type,
        &params,
        &config.parse_options(),
        &schema,
        &whitelist,
    )?;
    let rows = store.execute(&plan)?;

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

/// Minimal query-string splitter for the demo binary; an embedding web
/// framework hands over decoded pairs itself.
fn split_query_string(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
