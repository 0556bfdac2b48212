use devsim_config::DevsimConfig;

pub fn run(config: &DevsimConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Print as YAML for readability
    let yaml = config.to_yaml()?;
    println!("{}", yaml);

    Ok(())
}
