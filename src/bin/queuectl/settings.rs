use queuectl::db;
use queuectl_worker::settings;

#[derive(clap::Parser, Debug)]
#[command(name = "config", rename_all = "snake_case")]
pub enum Command {
    /// Store a setting. `retry_base`, `retry_max_delay` and `max_retries`
    /// must be positive integers.
    Set { key: String, value: String },
    /// Show all stored settings.
    List,
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Set { key, value } => {
            // Reject invalid values before connecting to the database.
            settings::validate(&key, &value)?;

            let mut conn = db::oneoff_connection().await?;
            settings::set(&mut conn, &key, &value).await?;
            println!("Set '{}' to '{value}'.", settings::normalize_key(&key));
        }
        Command::List => {
            let mut conn = db::oneoff_connection().await?;
            let values = settings::all(&mut conn).await?;

            if values.is_empty() {
                println!("No settings stored, using defaults.");
            }

            for (key, value) in values {
                println!("{key} = {value}");
            }
        }
    }

    Ok(())
}
