use crate::cli::CheckArgs;
use crate::config::Config;
use crate::documents::read_documents;
use crate::tasks::TaskRegistry;

pub fn execute(args: CheckArgs) -> anyhow::Result<()> {
    let mut config = Config::load(&args.config)?;
    if let Some(documents) = args.documents {
        config.documents_dir = documents;
    }
    config.validate()?;
    let registry = TaskRegistry::new(config.tasks.clone())?;

    println!("Config OK: {:?}", args.config);
    println!("Village: {}", config.village_name);

    match read_documents(&config.documents_dir, &config.document_include) {
        Ok(documents) => {
            println!(
                "\nDocuments in {:?}: {}",
                config.documents_dir,
                documents.len()
            );
            for (name, text) in &documents {
                println!("  - {} ({} bytes)", name, text.len());
            }
        }
        Err(e) => println!("\nDocuments: {}", e),
    }

    println!("\nTasks: {}", registry.len());
    for task in registry.iter() {
        println!("  - {} ({})", task.id, task.name);
    }

    println!("\nRoutes:");
    let mut missing = Vec::new();
    for model in config.models_in_use() {
        // validate() guarantees a route for every model in use
        let Some(profile) = config.profile_for(&model) else {
            continue;
        };
        let has_key = std::env::var(&profile.api_key_env)
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false);
        if !has_key {
            missing.push(profile.api_key_env.clone());
        }
        println!(
            "  - {} -> {} [{}]",
            model,
            profile.name,
            if has_key {
                "credentials found".to_string()
            } else {
                format!("${} not set", profile.api_key_env)
            }
        );
    }

    if !missing.is_empty() {
        println!("\nSet {} before running.", missing.join(", "));
    }
    Ok(())
}
