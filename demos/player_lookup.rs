//! Look up one player from the command line.
//!
//! ```text
//! RIOT_API_KEY=RGAPI-... cargo run --example player_lookup -- Ana EUW euw1
//! ```

use arena_relay::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(game_name), Some(tag_line)) = (args.next(), args.next()) else {
        eprintln!("usage: player_lookup <game_name> <tag_line> [region]");
        std::process::exit(2);
    };
    let region = args.next().unwrap_or_else(|| "euw1".to_string());

    let config = RelayConfig::from_env()?;
    let transport = ReqwestTransport::new(config.api_key.clone())?;
    let lookup = PlayerLookup::from_config(&config, transport, MemoryStore::new());

    let player = lookup.lookup(&game_name, &tag_line, &region).await?.into_value();
    println!(
        "{} on {}: level {}, {} champions, {} mastery points",
        player.account.riot_id(),
        player.region,
        player.profile.level,
        player.masteries.len(),
        player.total_points()
    );

    let mut top = player.masteries.clone();
    top.sort_by(|a, b| b.points.cmp(&a.points));
    for mastery in top.iter().take(5) {
        println!(
            "  champion {:>4}  level {:>2}  {:>8} points",
            mastery.champion_id, mastery.level, mastery.points
        );
    }

    // Served from the cache this time.
    let again = lookup.lookup(&game_name, &tag_line, &region).await?;
    println!("second lookup from cache: {}", again.from_cache);

    Ok(())
}
