//! `callerinfo show-config`: Print the effective configuration.

use super::ConfigArgs;

pub fn execute(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = args.load()?;
    print!("{}", config.to_toml()?);
    Ok(())
}
