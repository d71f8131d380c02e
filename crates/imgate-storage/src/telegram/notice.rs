use super::client::TelegramClient;
use imgate_core::{TelegramSettings, UploadResult};

pub const DEFAULT_NOTICE_TEMPLATE: &str =
    "{username} {date} uploaded image {filename}, storage [{StorageType}]";

/// Values substituted into a notice template.
#[derive(Debug, Clone, Default)]
pub struct NoticeData {
    pub username: String,
    pub date: String,
    pub filename: String,
    pub storage_type: String,
    pub url: String,
}

impl NoticeData {
    pub fn from_upload(result: &UploadResult, username: &str) -> Self {
        Self {
            username: username.to_string(),
            date: result.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            filename: result.file_name.clone(),
            storage_type: result.storage.as_str().to_string(),
            url: result.url.clone(),
        }
    }
}

/// Expand `template` (or the default one when empty) with a trailing URL line.
pub fn render_notice(template: &str, data: &NoticeData) -> String {
    let template = if template.trim().is_empty() {
        DEFAULT_NOTICE_TEMPLATE
    } else {
        template
    };

    format!("{}\n\nURL: {{url}}", template)
        .replace("{username}", &data.username)
        .replace("{date}", &data.date)
        .replace("{filename}", &data.filename)
        .replace("{StorageType}", &data.storage_type)
        .replace("{url}", &data.url)
}

/// Send the upload notice to every receiver when notices are on. Failures are only logged.
pub async fn notify_upload(
    client: &TelegramClient,
    settings: &TelegramSettings,
    result: &UploadResult,
    username: &str,
) {
    if !settings.notice {
        return;
    }

    let text = render_notice(&settings.notice_text, &NoticeData::from_upload(result, username));
    for receiver in settings.receivers_list() {
        if let Err(e) = client.send_message(&receiver, &text).await {
            tracing::warn!(error = %e, receiver = %receiver, "Telegram upload notice failed");
        }
    }
}
