//! OAuth2 callback server
//!
//! Listens once on the redirect URI's host and port and captures the
//! authorization code from the browser redirect.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;
use crate::Result;
use crate::error::Error;

const PAGE_STYLE: &str = r#"<style>
        body {
            background-color: #0f172a;
            color: #e2e8f0;
            font-family: -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        h1 { font-size: 22px; margin: 0 0 12px; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>"#;

fn render_page(title: &str, icon: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <meta charset=\"UTF-8\">\n    <title>Orbit | {title}</title>\n    {style}\n</head>\n<body>\n    <div>\n        <div style=\"font-size:48px\">{icon}</div>\n        <h1>{title}</h1>\n        <p>{message}</p>\n    </div>\n</body>\n</html>",
        title = title,
        style = PAGE_STYLE,
        icon = icon,
        message = message,
    )
}

/// Authorization code from the callback
#[derive(Debug, Clone)]
pub struct AuthorizationResult {
    pub code: String,
    pub state: Option<String>,
}

/// Where the callback server listens, derived from the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAddress {
    pub bind_addr: String,
    pub path: String,
}

impl CallbackAddress {
    pub fn from_redirect_uri(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| Error::Config(format!("Invalid redirect URI {}: {}", redirect_uri, e)))?;
        let host = url.host_str().unwrap_or("127.0.0.1");
        let host = if host == "localhost" { "127.0.0.1" } else { host };
        let port = url.port_or_known_default().unwrap_or(80);

        Ok(Self {
            bind_addr: format!("{}:{}", host, port),
            path: url.path().to_string(),
        })
    }
}

/// Bind the callback listener. Done before the browser opens so the redirect
/// cannot race the bind.
pub async fn bind(address: &CallbackAddress) -> Result<TcpListener> {
    let listener = TcpListener::bind(&address.bind_addr).await
        .map_err(|e| Error::OAuth(format!("Failed to start callback server on {}: {}", address.bind_addr, e)))?;
    tracing::info!("Callback server listening on http://{}{}", address.bind_addr, address.path);
    Ok(listener)
}

/// Serve requests until one arrives on the callback path.
pub async fn wait_for_callback(
    listener: TcpListener,
    address: &CallbackAddress,
    expected_state: &str,
) -> Result<AuthorizationResult> {
    loop {
        let (mut socket, _) = listener.accept().await
            .map_err(|e| Error::OAuth(format!("Failed to accept connection: {}", e)))?;

        let mut buffer = vec![0u8; 8192];
        let n = socket.read(&mut buffer).await
            .map_err(|e| Error::OAuth(format!("Failed to read request: {}", e)))?;
        let request = String::from_utf8_lossy(&buffer[..n]);

        let Some(result) = parse_callback_request(&request, &address.path, expected_state) else {
            // favicon and friends
            let _ = socket.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
            continue;
        };

        let (status, body) = match &result {
            Ok(_) => ("200 OK", render_page(
                "Gmail Connected",
                "✅",
                "Your Google account is linked.<br>You can close this window and return to your terminal.",
            )),
            Err(e) => ("400 Bad Request", render_page(
                "Connection Failed",
                "⚠️",
                &format!("{}<br>Please run <code>orbit connect</code> again.", e),
            )),
        };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;

        return result;
    }
}

/// `None` when the request is not for the callback path.
fn parse_callback_request(
    request: &str,
    callback_path: &str,
    expected_state: &str,
) -> Option<Result<AuthorizationResult>> {
    let first_line = request.lines().next()?;

    // GET /oauth/gmail/callback?code=xxx&state=yyy HTTP/1.1
    let target = first_line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{}", target)).ok()?;
    if url.path() != callback_path {
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            _ => {}
        }
    }

    if let Some(err) = error {
        return Some(Err(Error::OAuth(format!("Authorization failed: {}", err))));
    }

    match &state {
        Some(s) if s == expected_state => {}
        Some(_) => return Some(Err(Error::OAuth("State mismatch in OAuth callback".to_string()))),
        None => return Some(Err(Error::OAuth("Missing state parameter".to_string()))),
    }

    Some(
        code.map(|code| AuthorizationResult { code, state })
            .ok_or_else(|| Error::OAuth("Missing authorization code".to_string())),
    )
}
