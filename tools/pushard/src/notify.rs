use crate::logging::append_run_log;
use serde::Serialize;
use serde_json::json;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Operator notifications. Best-effort: delivery problems are logged and
/// never reach the deploy.
pub trait Notifier {
    fn send(&self, text: &str);
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn send(&self, _text: &str) {}
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Posts to the Telegram Bot API from a background thread so a slow or
/// unreachable API never holds up the deploy. Messages go out in order;
/// dropping the notifier waits at most one request timeout for the queue.
pub struct TelegramNotifier {
    outbox: Option<mpsc::Sender<String>>,
    drained: mpsc::Receiver<()>,
    shutdown_grace: Duration,
}

struct TelegramClient {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String, timeout: Duration) -> Self {
        Self::with_endpoint(TELEGRAM_API_URL, token, chat_id, timeout)
    }

    pub fn with_endpoint(
        base_url: impl Into<String>,
        token: String,
        chat_id: String,
        timeout: Duration,
    ) -> Self {
        let (outbox, inbox) = mpsc::channel::<String>();
        let (drained_tx, drained) = mpsc::channel();
        let base_url = base_url.into();
        thread::spawn(move || {
            let client = reqwest::blocking::Client::builder()
                .user_agent(concat!("pushard/", env!("CARGO_PKG_VERSION")))
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new());
            let telegram = TelegramClient {
                client,
                base_url,
                token,
                chat_id,
            };
            for text in inbox {
                telegram.deliver(&text);
            }
            let _ = drained_tx.send(());
        });
        append_run_log(
            "debug",
            "notify.telegram.started",
            json!({ "timeout_ms": timeout.as_millis() as u64 }),
        );
        Self {
            outbox: Some(outbox),
            drained,
            shutdown_grace: timeout,
        }
    }
}

impl TelegramClient {
    fn deliver(&self, text: &str) {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let result = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send();
        match result {
            Ok(response) if response.status().is_success() => {
                append_run_log("debug", "notify.telegram.sent", json!({ "text": text }));
            }
            Ok(response) => append_run_log(
                "warn",
                "notify.telegram.rejected",
                json!({ "status": response.status().as_u16(), "text": text }),
            ),
            // reqwest errors carry the URL, which carries the bot token.
            Err(error) => append_run_log(
                "warn",
                "notify.telegram.failed",
                json!({ "error": error.without_url().to_string(), "text": text }),
            ),
        }
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, text: &str) {
        let queued = self
            .outbox
            .as_ref()
            .is_some_and(|outbox| outbox.send(text.to_string()).is_ok());
        if !queued {
            append_run_log("warn", "notify.telegram.dropped", json!({ "text": text }));
        }
    }
}

impl Drop for TelegramNotifier {
    fn drop(&mut self) {
        self.outbox.take();
        if self.drained.recv_timeout(self.shutdown_grace).is_err() {
            append_run_log(
                "warn",
                "notify.telegram.flush_timed_out",
                json!({ "grace_ms": self.shutdown_grace.as_millis() as u64 }),
            );
        }
    }
}

/// Telegram when both the bot token and the chat id are configured,
/// otherwise a no-op.
pub fn notifier_from_settings(
    token: Option<String>,
    chat_id: Option<String>,
    timeout: Duration,
) -> Box<dyn Notifier> {
    match (token, chat_id) {
        (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
            Box::new(TelegramNotifier::new(token, chat_id, timeout))
        }
        _ => {
            append_run_log("info", "notify.disabled", json!({}));
            Box::new(NoopNotifier)
        }
    }
}

/// Records messages instead of sending them.
#[derive(Default, Clone)]
pub struct FakeNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl FakeNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl Notifier for FakeNotifier {
    fn send(&self, text: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(text.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{notifier_from_settings, Notifier, SendMessage, TelegramNotifier};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    #[test]
    fn unreachable_endpoint_does_not_panic_or_block_forever() {
        let notifier = TelegramNotifier::with_endpoint(
            "http://127.0.0.1:9",
            "123:abc".to_string(),
            "42".to_string(),
            Duration::from_millis(200),
        );
        notifier.send("🟢 START");
    }

    #[test]
    fn silent_endpoint_never_holds_up_the_caller() {
        // Accepts connections but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let endpoint = format!("http://{}", listener.local_addr().expect("addr"));
        let timeout = Duration::from_secs(2);
        let notifier = TelegramNotifier::with_endpoint(
            endpoint,
            "123:abc".to_string(),
            "42".to_string(),
            timeout,
        );

        let started = Instant::now();
        notifier.send("🟢 START");
        notifier.send("loop nr. 1 of 1");
        notifier.send("🏁 FINISH 🏁");
        assert!(started.elapsed() < Duration::from_secs(1));

        let dropping = Instant::now();
        drop(notifier);
        assert!(dropping.elapsed() < timeout + Duration::from_secs(3));
        drop(listener);
    }

    #[test]
    fn send_message_body_carries_chat_id_and_text() {
        let body = serde_json::to_string(&SendMessage {
            chat_id: "42",
            text: "🏁 FINISH 🏁",
        })
        .expect("serialize");
        assert_eq!(body, "{\"chat_id\":\"42\",\"text\":\"🏁 FINISH 🏁\"}");
    }

    #[test]
    fn missing_chat_id_yields_silent_notifier() {
        let notifier =
            notifier_from_settings(Some("123:abc".to_string()), None, Duration::from_secs(1));
        notifier.send("dropped");
    }
}
