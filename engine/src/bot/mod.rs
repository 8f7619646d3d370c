//! Telegram Registration Bot
//!
//! Provides a long-polling interface that walks students through a
//! three-step registration dialogue (full name, e-mail, group) and records
//! completed registrations in the shared roster. The same client exposes
//! the send primitives used by the report delivery endpoint.

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::roster::{Roster, RosterEntry};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Pattern for full names: Cyrillic or Latin letters and spaces only
static FULL_NAME_PATTERN: OnceLock<regex::Regex> = OnceLock::new();

/// Pattern for e-mail addresses: something@something.something
static EMAIL_PATTERN: OnceLock<regex::Regex> = OnceLock::new();

fn full_name_pattern() -> &'static regex::Regex {
    FULL_NAME_PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[А-ЯЁа-яёA-Za-z ]+$").expect("Invalid full name pattern")
    })
}

fn email_pattern() -> &'static regex::Regex {
    EMAIL_PATTERN
        .get_or_init(|| regex::Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("Invalid e-mail pattern"))
}

/// Whether a string is acceptable as a student's full name
pub fn is_valid_full_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && full_name_pattern().is_match(trimmed)
}

/// Whether a string looks like an e-mail address
pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email.trim())
}

/// Where a student currently is in the registration dialogue.
///
/// Answers collected so far ride along in the variant, so an interrupted
/// dialogue holds everything needed to resume at the pending question.
#[derive(Debug, Clone, PartialEq)]
enum RegistrationState {
    AwaitingName,
    AwaitingEmail { full_name: String },
    AwaitingGroup { full_name: String, email: String },
}

#[derive(Deserialize, Debug)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize, Debug)]
struct Message {
    chat: Chat,
    text: Option<String>,
    from: Option<User>,
}

#[derive(Deserialize, Debug)]
struct Chat {
    id: i64,
}

#[derive(Deserialize, Debug)]
struct User {
    id: i64,
}

#[derive(Deserialize, Debug)]
struct GetUpdatesResponse {
    ok: bool,
    result: Option<Vec<Update>>,
}

#[derive(Clone)]
pub struct TelegramBot {
    token: String,
    api_base: String,
    client: Client,
    roster: Roster,
    sessions: Arc<Mutex<HashMap<i64, RegistrationState>>>,
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("api_base", &self.api_base)
            .field("roster", &self.roster)
            .finish()
    }
}

impl TelegramBot {
    pub fn new(token: String, roster: Roster) -> Self {
        Self {
            token,
            api_base: TELEGRAM_API_BASE.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            roster,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Override the API base URL (used in tests against a mock server)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Start the long-polling loop
    ///
    /// This will block the current task. Should be spawned in a background
    /// tokio::task when run next to the HTTP server.
    pub async fn start_polling(&self) -> Result<()> {
        info!("Starting Telegram bot long-polling loop...");
        self.roster.ensure_exists()?;
        let mut offset = 0;

        loop {
            match self.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = update.update_id + 1;
                        if let Some(msg) = update.message {
                            self.handle_message(&msg).await;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to fetch Telegram updates: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let url = format!(
            "{}?offset={}&timeout=30",
            self.method_url("getUpdates"),
            offset
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .json::<GetUpdatesResponse>()
            .await?;

        if !response.ok {
            return Err(anyhow::anyhow!("Telegram API returned ok=false"));
        }

        Ok(response.result.unwrap_or_default())
    }

    async fn handle_message(&self, msg: &Message) {
        let chat_id = msg.chat.id;

        let user_id = match msg.from.as_ref() {
            Some(user) => user.id,
            None => {
                warn!("Message with no sender info - ignoring");
                return;
            }
        };

        // Stickers, photos and other non-text payloads
        let Some(text) = msg.text.as_deref() else {
            return;
        };

        if text.starts_with("/start") {
            self.handle_start(chat_id, user_id).await;
            return;
        }

        let state = { self.sessions.lock().await.get(&user_id).cloned() };
        match state {
            Some(RegistrationState::AwaitingName) => {
                self.process_full_name(chat_id, user_id, text).await;
            }
            Some(RegistrationState::AwaitingEmail { full_name }) => {
                self.process_email(chat_id, user_id, text, full_name).await;
            }
            Some(RegistrationState::AwaitingGroup { full_name, email }) => {
                self.process_group(chat_id, user_id, text, full_name, email)
                    .await;
            }
            // No dialogue in progress; nothing to do with free-form text
            None => {}
        }
    }

    async fn handle_start(&self, chat_id: i64, user_id: i64) {
        match self.roster.is_registered(user_id) {
            Ok(true) => {
                self.reply(chat_id, "Вы уже зарегистрированы!").await;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Failed to read roster: {}", e);
                return;
            }
        }

        self.reply(
            chat_id,
            "Привет! Добро пожаловать в бот для проверки лабораторных работ.",
        )
        .await;
        self.reply(chat_id, "Введите ваше ФИО (например: Иванов Иван Иванович):")
            .await;
        self.sessions
            .lock()
            .await
            .insert(user_id, RegistrationState::AwaitingName);
    }

    async fn process_full_name(&self, chat_id: i64, user_id: i64, text: &str) {
        if !is_valid_full_name(text) {
            self.reply(chat_id, "Ошибка! ФИО должно содержать только буквы и пробелы!")
                .await;
            return;
        }

        self.sessions.lock().await.insert(
            user_id,
            RegistrationState::AwaitingEmail {
                full_name: text.trim().to_string(),
            },
        );
        self.reply(chat_id, "Теперь введите вашу почту (например: example@edu.hse.ru):")
            .await;
    }

    async fn process_email(&self, chat_id: i64, user_id: i64, text: &str, full_name: String) {
        if !is_valid_email(text) {
            self.reply(chat_id, "Ошибка! Некорректный формат почты!").await;
            return;
        }

        self.sessions.lock().await.insert(
            user_id,
            RegistrationState::AwaitingGroup {
                full_name,
                email: text.trim().to_string(),
            },
        );
        self.reply(chat_id, "Теперь введите вашу группу (например: БИТ231):")
            .await;
    }

    async fn process_group(
        &self,
        chat_id: i64,
        user_id: i64,
        text: &str,
        full_name: String,
        email: String,
    ) {
        let entry = RosterEntry {
            user_id,
            full_name,
            group: text.trim().to_string(),
            email,
        };

        // Session stays at the group question when the write fails, so the
        // student can just resend the group name.
        if let Err(e) = self.roster.append(&entry) {
            error!("Failed to record registration for {}: {}", user_id, e);
            return;
        }
        self.sessions.lock().await.remove(&user_id);

        info!("Registered student {} ({})", entry.full_name, user_id);
        self.reply(
            chat_id,
            &format!(
                "✅ Регистрация завершена!\nФИО: {}\nГруппа: {}\nПочта: {}",
                entry.full_name, entry.group, entry.email
            ),
        )
        .await;
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.send_message(chat_id, text).await {
            error!("Failed to send reply to {}: {}", chat_id, e);
        }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = self.method_url("sendMessage");

        #[derive(Serialize)]
        struct SendMessageRequest<'a> {
            chat_id: i64,
            text: &'a str,
        }

        self.client
            .post(&url)
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Upload a file to a chat with a caption, as multipart/form-data
    pub async fn send_document(&self, chat_id: i64, path: &Path, caption: &str) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        self.client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
