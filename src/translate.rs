//! Remote streaming translation.
//!
//! The translation provider speaks a websocket protocol with an
//! HMAC-SHA256 signed handshake URL. One JSON request goes out per
//! connection; the reply arrives as a stream of frames whose content
//! chunks are appended to a caller-supplied sink. The provider closes
//! the stream itself. Stream errors are logged and swallowed; callers
//! hold a handle to cancel an in-flight translation.

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::{Value, json};
use sha2::Sha256;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error};
use url::Url;

use crate::dom::{Fragment, NodeId};
use crate::widgets::EN_CN_PAIRS;

#[derive(Debug)]
pub enum TranslateError {
    Url(url::ParseError),
    MissingHost,
    InvalidSecret,
    Serialize(serde_json::Error),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::Url(err) => write!(f, "invalid endpoint url: {err}"),
            TranslateError::MissingHost => write!(f, "endpoint url has no host"),
            TranslateError::InvalidSecret => write!(f, "api secret is not a valid hmac key"),
            TranslateError::Serialize(err) => write!(f, "request serialization failed: {err}"),
        }
    }
}

impl std::error::Error for TranslateError {}

impl From<url::ParseError> for TranslateError {
    fn from(err: url::ParseError) -> Self {
        TranslateError::Url(err)
    }
}

/// Builds the signed handshake URL for one connection attempt. The
/// signature covers the host, the RFC 1123 date, and the request line;
/// the result is deterministic for fixed inputs.
pub fn signed_url(
    endpoint: &str,
    api_key: &str,
    api_secret: &str,
    date: DateTime<Utc>,
) -> Result<Url, TranslateError> {
    let mut url = Url::parse(endpoint)?;
    let host = url
        .host_str()
        .ok_or(TranslateError::MissingHost)?
        .to_string();
    let date = date.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let origin = format!(
        "host: {host}\ndate: {date}\nGET {path} HTTP/1.1",
        path = url.path()
    );
    let mut mac = Hmac::<Sha256>::new_from_slice(api_secret.as_bytes())
        .map_err(|_| TranslateError::InvalidSecret)?;
    mac.update(origin.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());
    let authorization_line = format!(
        "api_key=\"{api_key}\", algorithm=\"hmac-sha256\", \
         headers=\"host date request-line\", signature=\"{signature}\""
    );
    let authorization = BASE64.encode(authorization_line);
    url.query_pairs_mut()
        .append_pair("authorization", &authorization)
        .append_pair("date", &date)
        .append_pair("host", &host)
        .finish();
    Ok(url)
}

/// The fixed request envelope: one user message, temperature 0.5, a
/// 4096 token cap.
pub fn chat_request(app_id: &str, domain: &str, content: &str) -> Value {
    json!({
        "header": {
            "app_id": app_id,
            "uid": "1234",
        },
        "parameter": {
            "chat": {
                "domain": domain,
                "temperature": 0.5,
                "max_tokens": 4096,
            }
        },
        "payload": {
            "message": {
                "text": [
                    { "role": "user", "content": content }
                ]
            }
        }
    })
}

/// Pulls the first content chunk out of one reply frame.
pub fn extract_content(frame: &str) -> Option<String> {
    let value: Value = serde_json::from_str(frame).ok()?;
    value["payload"]["choices"]["text"][0]["content"]
        .as_str()
        .map(str::to_string)
}

/// Whether a frame is the provider's final one for the stream.
pub fn is_final_frame(frame: &str) -> bool {
    serde_json::from_str::<Value>(frame)
        .map(|value| value["header"]["status"].as_i64() == Some(2))
        .unwrap_or(false)
}

/// The prompt wrapped around the text to translate.
pub fn prompt_for(text: &str) -> String {
    format!("\u{8bf7}\u{5c06}\u{4e0b}\u{9762}\u{7684}\u{82f1}\u{6587}\u{7ffb}\u{8bd1}\u{6210}\u{4e2d}\u{6587}\u{ff0c}\u{53ea}\u{8f93}\u{51fa}\u{8bd1}\u{6587}\u{ff1a}\n{text}")
}

/// Destination for streamed translation chunks.
pub trait AppendSink: Send + Sync {
    fn append(&self, chunk: &str);
}

/// Shared-string sink; the UI layer reads it between appends.
#[derive(Debug, Default, Clone)]
pub struct SharedText(Arc<Mutex<String>>);

impl SharedText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> String {
        self.0.lock().clone()
    }
}

impl AppendSink for SharedText {
    fn append(&self, chunk: &str) {
        self.0.lock().push_str(chunk);
    }
}

/// An in-flight translation. Dropping the handle leaves the stream
/// running; `cancel` aborts it.
pub struct TranslationHandle {
    task: JoinHandle<()>,
}

impl TranslationHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct Translator {
    endpoint: String,
    domain: String,
    credentials: Credentials,
}

impl Translator {
    pub fn new(endpoint: &str, domain: &str, credentials: Credentials) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            domain: domain.to_string(),
            credentials,
        }
    }

    /// Starts one streaming translation. Signing failures surface here;
    /// everything after the handshake is fire-and-stream with errors
    /// logged only, leaving the sink as-is.
    pub fn translate(
        &self,
        text: &str,
        sink: Arc<dyn AppendSink>,
    ) -> Result<TranslationHandle, TranslateError> {
        let url = signed_url(
            &self.endpoint,
            &self.credentials.api_key,
            &self.credentials.api_secret,
            Utc::now(),
        )?;
        let request = chat_request(&self.credentials.app_id, &self.domain, &prompt_for(text));
        let body = serde_json::to_string(&request).map_err(TranslateError::Serialize)?;
        let task = tokio::spawn(async move {
            let (mut stream, _) = match connect_async(url.as_str()).await {
                Ok(connected) => connected,
                Err(err) => {
                    error!(%err, "translation handshake failed");
                    return;
                }
            };
            if let Err(err) = stream.send(Message::Text(body)).await {
                error!(%err, "translation request send failed");
                return;
            }
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(frame)) => {
                        if let Some(chunk) = extract_content(&frame) {
                            sink.append(&chunk);
                        }
                        if is_final_frame(&frame) {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        error!(%err, "translation stream failed");
                        break;
                    }
                }
            }
            debug!("translation stream closed");
        });
        Ok(TranslationHandle { task })
    }
}

/// Whether a block may request a translation: it must be marked
/// translatable, carry no output span yet, and have no paired
/// translated text already.
pub fn needs_translation(frag: &Fragment, block: NodeId) -> bool {
    if frag.attr(block, "data-translatable").is_none() {
        return false;
    }
    if frag
        .find(block, |f, id| f.has_class(id, "llm"))
        .first()
        .is_some()
    {
        return false;
    }
    let paired = frag
        .first_class(block)
        .and_then(|class| {
            EN_CN_PAIRS
                .iter()
                .find(|(en, _)| *en == class)
                .map(|&(_, cn)| cn)
        })
        .and_then(|cn_class| {
            frag.siblings(block)
                .into_iter()
                .find(|&s| frag.has_class(s, cn_class))
        });
    match paired {
        Some(cn) => frag.text(cn).trim().is_empty(),
        None => true,
    }
}

/// Appends the span streamed output renders into.
pub fn attach_output_span(frag: &mut Fragment, block: NodeId) -> NodeId {
    let span = frag.create_element("span");
    frag.set_class(span, "llm");
    frag.append_child(block, span);
    span
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 0).unwrap()
    }

    #[test]
    fn signed_url_is_deterministic_and_carries_params() {
        let first = signed_url("wss://api.example.com/v1/chat", "key1", "secret1", fixed_date())
            .unwrap();
        let second = signed_url("wss://api.example.com/v1/chat", "key1", "secret1", fixed_date())
            .unwrap();
        assert_eq!(first, second);

        let params: std::collections::HashMap<String, String> = first
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(params["date"], "Sat, 04 May 2024 12:30:00 GMT");
        assert_eq!(params["host"], "api.example.com");
        let line = String::from_utf8(BASE64.decode(&params["authorization"]).unwrap()).unwrap();
        assert!(line.contains("api_key=\"key1\""));
        assert!(line.contains("algorithm=\"hmac-sha256\""));
        assert!(line.contains("headers=\"host date request-line\""));
        assert!(line.contains("signature=\""));

        // A different secret changes only the signature.
        let other = signed_url("wss://api.example.com/v1/chat", "key1", "secret2", fixed_date())
            .unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn signed_url_rejects_bad_endpoints() {
        assert!(matches!(
            signed_url("not a url", "k", "s", fixed_date()),
            Err(TranslateError::Url(_))
        ));
    }

    #[test]
    fn chat_request_envelope_shape() {
        let request = chat_request("app42", "xdeepseekv3", "hello");
        assert_eq!(request["header"]["app_id"], "app42");
        assert_eq!(request["header"]["uid"], "1234");
        assert_eq!(request["parameter"]["chat"]["domain"], "xdeepseekv3");
        assert_eq!(request["parameter"]["chat"]["temperature"], 0.5);
        assert_eq!(request["parameter"]["chat"]["max_tokens"], 4096);
        assert_eq!(request["payload"]["message"]["text"][0]["role"], "user");
        assert_eq!(request["payload"]["message"]["text"][0]["content"], "hello");
    }

    #[test]
    fn extract_content_reads_first_chunk() {
        let frame = r#"{"header":{"status":1},"payload":{"choices":{"text":[{"content":"你好"}]}}}"#;
        assert_eq!(extract_content(frame).as_deref(), Some("你好"));
        assert!(!is_final_frame(frame));

        let last = r#"{"header":{"status":2},"payload":{"choices":{"text":[{"content":"!"}]}}}"#;
        assert!(is_final_frame(last));
        assert!(extract_content(r#"{"header":{"status":1}}"#).is_none());
        assert!(extract_content("not json").is_none());
    }

    #[test]
    fn shared_text_accumulates() {
        let sink = SharedText::new();
        sink.append("你");
        sink.append("好");
        assert_eq!(sink.snapshot(), "你好");
    }

    #[test]
    fn translation_guards() {
        let mut frag = Fragment::parse(
            r#"<div><span class="def" data-translatable="">en</span><span class="defcn"></span></div>"#,
        );
        let frag_root = frag.root();
        let def = frag
            .select_first(frag_root, &crate::dom::Selector::parse(".def"))
            .unwrap();
        assert!(needs_translation(&frag, def));

        // An existing output span blocks a second request.
        attach_output_span(&mut frag, def);
        assert!(!needs_translation(&frag, def));

        // Non-empty paired text blocks a request.
        let mut frag = Fragment::parse(
            r#"<div><span class="def" data-translatable="">en</span><span class="defcn">已有</span></div>"#,
        );
        let def = frag
            .select_first(frag.root(), &crate::dom::Selector::parse(".def"))
            .unwrap();
        assert!(!needs_translation(&frag, def));

        // Unmarked blocks never translate.
        let frag = Fragment::parse(r#"<div><span class="def">en</span></div>"#);
        let def = frag
            .select_first(frag.root(), &crate::dom::Selector::parse(".def"))
            .unwrap();
        assert!(!needs_translation(&frag, def));
    }
}
