use cricket_predictions::{establish_connection, reset_database, run_migrations, Config, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = Config::from_env()?;
    let mut conn = establish_connection(&config.database_url)?;
    run_migrations(&mut conn)?;
    reset_database(&mut conn)?;
    println!("Database has been reset.");
    Ok(())
}
