use std::path::Path;

use anyhow::Result;
use ens_io::read_assets;

pub fn handle(assets: &Path, json: bool) -> Result<()> {
    let hierarchy = read_assets(assets)?;
    let stats = hierarchy.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Hierarchy statistics for {}:", assets.display());
    println!("  Plants          : {}", stats.plants);
    println!("  Groupings       : {}", stats.groupings);
    println!("  Units           : {}", stats.units);
    println!("  Max depth       : {}", stats.max_depth);
    println!("  Installed power : {}", stats.installed_power);
    Ok(())
}
