//! Model listing command.

use console::style;

use indexner::config::Config;
use indexner::recognizer::{Backend, RecognizerFactory};

/// List configured language and model keys.
pub async fn cmd_models(config: &Config, check: bool) -> anyhow::Result<()> {
    let factory = RecognizerFactory::new(config.recognizer.clone());

    println!("{}", style("Recognizer models").bold());
    for (key, spec) in factory.models() {
        let target = match spec.backend {
            Backend::Remote => format!(
                "remote {} @ {}",
                spec.model.as_deref().unwrap_or("?"),
                config.recognizer.endpoint
            ),
            Backend::Pattern => "built-in pattern recognizer".to_string(),
        };

        if !check {
            println!("  {:<12} {}", key, target);
            continue;
        }

        let status = match factory.build(key) {
            Ok(recognizer) => {
                if recognizer.is_available().await {
                    style("available".to_string()).green()
                } else {
                    style("unavailable".to_string()).red()
                }
            }
            Err(e) => style(e.to_string()).red(),
        };
        println!("  {:<12} {} ({})", key, target, status);
    }
    Ok(())
}
