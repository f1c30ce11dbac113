use std::time::Duration;

use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  Kind Config
// ═══════════════════════════════════════════════════════════════

/// Привязка kind'а к суффиксу topic'а / subject'а.
/// Декодер задаётся в коде по имени kind'а (см. `KindCatalog::from_config`).
#[derive(Debug, Clone, Deserialize)]
pub struct KindConfig {
    /// Имя kind'а (e.g., "wallet-projection-event").
    pub name: String,
    /// Суффикс topic'а или subject'а (e.g., "wallet.projection").
    pub suffix: String,
}

// ═══════════════════════════════════════════════════════════════
//  Pull Config
// ═══════════════════════════════════════════════════════════════

/// С какого места читать log при старте.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// seek_to_end(): только записи, появившиеся после старта.
    #[default]
    End,
    /// Прочитать и то, что уже лежит в log'е.
    #[serde(alias = "replay")]
    Beginning,
}

/// Конфигурация pull consumer loop'а (log-style broker).
#[derive(Debug, Clone, Deserialize)]
pub struct PullConfig {
    #[serde(default = "default_pull_name")]
    pub name: String,
    /// Topic'и, на которые подписан loop.
    pub topics: Vec<String>,
    /// Откуда начинать чтение. Задаётся явно, по умолчанию с конца.
    #[serde(default)]
    pub start: StartPosition,
    /// Максимальная длительность одного poll().
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    /// Таймаут assign() + seek_to_end() при старте.
    #[serde(default = "default_setup_timeout_ms")]
    pub setup_timeout_ms: u64,
    /// Пауза после ошибки poll() перед следующей попыткой.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Таймаут close() соединения.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// Сколько ждать остановки loop'а перед тем как бросить его.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl PullConfig {
    pub fn new(name: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            name: name.into(),
            topics,
            start: StartPosition::default(),
            poll_ms: default_poll_ms(),
            setup_timeout_ms: default_setup_timeout_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate: хотя бы один topic, ненулевой poll.
    pub fn validate(&self) -> Result<(), String> {
        if self.topics.is_empty() {
            return Err(format!("pull [{}]: at least one topic required", self.name));
        }
        if self.poll_ms == 0 {
            return Err(format!("pull [{}]: poll_ms must be > 0", self.name));
        }
        Ok(())
    }
}

fn default_pull_name() -> String {
    "pull".into()
}
fn default_poll_ms() -> u64 {
    200
}
fn default_setup_timeout_ms() -> u64 {
    10_000
}
fn default_error_backoff_ms() -> u64 {
    1000
}
fn default_close_timeout_ms() -> u64 {
    2000
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}

// ═══════════════════════════════════════════════════════════════
//  Push Config
// ═══════════════════════════════════════════════════════════════

/// Конфигурация push подписки (pub/sub broker).
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_name")]
    pub name: String,
    /// Subject pattern подписки (e.g., "wallet.events.>").
    pub subject_pattern: String,
    /// Через сколько broker повторно доставит неподтверждённое сообщение.
    #[serde(default = "default_ack_wait_ms")]
    pub ack_wait_ms: u64,
    /// Сколько подряд неудачных переподключений допускается.
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
    /// Пауза между попытками переподключения.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl PushConfig {
    pub fn new(name: impl Into<String>, subject_pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject_pattern: subject_pattern.into(),
            ack_wait_ms: default_ack_wait_ms(),
            max_reconnects: default_max_reconnects(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }

    pub fn ack_wait(&self) -> Duration {
        Duration::from_millis(self.ack_wait_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.subject_pattern.trim().is_empty() {
            return Err(format!("push [{}]: subject_pattern is empty", self.name));
        }
        if self.ack_wait_ms == 0 {
            return Err(format!("push [{}]: ack_wait_ms must be > 0", self.name));
        }
        Ok(())
    }
}

fn default_push_name() -> String {
    "push".into()
}
fn default_ack_wait_ms() -> u64 {
    30_000
}
fn default_max_reconnects() -> u32 {
    5
}
fn default_reconnect_delay_ms() -> u64 {
    500
}
