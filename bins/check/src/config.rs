use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "converge-check", about = "Проверка конфигурации harness'а")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Загрузить и проверить TOML конфиг
    Validate(ValidateArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "harness.toml", env = "CONFIG_PATH")]
    pub config: String,
}
