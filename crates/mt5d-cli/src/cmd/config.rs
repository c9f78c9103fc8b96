use crate::output::print_json;

/// Print the resolved settings. The password is always masked.
pub fn run(json: bool) -> anyhow::Result<()> {
    let settings = super::load_settings()?.redacted();
    if json {
        print_json(&settings)
    } else {
        print!("{}", serde_yaml::to_string(&settings)?);
        Ok(())
    }
}
