use crate::client::QnapError;
use crate::client::QnapError::Auth;
use crate::transport::Transport;
use crate::utils::encode_password;
use crate::xml::Document;
use log::{debug, warn};
use tokio::sync::Mutex;

const LOGIN_PATH: &str = "authLogin.cgi";

/// Login credentials, password already in its wire form
pub(crate) struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub(crate) fn new(username: String, password: &str) -> Self {
        Self {
            username,
            password: encode_password(password),
        }
    }

    fn form(&self) -> [(&str, &str); 2] {
        [("user", self.username.as_str()), ("pwd", self.password.as_str())]
    }
}

#[derive(Default)]
struct Session {
    sid: Option<String>,
    error: bool,
}

/// Owns the session token and renews it on demand.
///
/// The state is behind an async mutex which stays locked during login, so
/// concurrent callers wait for a single login instead of racing.
pub(crate) struct SessionManager {
    credentials: Credentials,
    state: Mutex<Session>,
}

impl SessionManager {
    pub(crate) fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: Mutex::new(Session::default()),
        }
    }

    /// Returns the current session token, logging in first if there is none
    pub(crate) async fn ensure_session(&self, transport: &Transport) -> Result<String, QnapError> {
        let mut session = self.state.lock().await;
        if !session.error {
            if let Some(sid) = &session.sid {
                return Ok(sid.clone());
            }
        }

        session.sid = None;
        session.error = false;
        debug!("Creating new session");

        match self.login(transport).await {
            Ok(sid) => {
                if transport.debug() {
                    debug!("Logged in, SID: {sid}");
                }
                session.sid = Some(sid.clone());
                Ok(sid)
            }
            Err(e) => {
                warn!("Login failed, unable to process request: {e}");
                session.error = true;
                Err(e)
            }
        }
    }

    /// Drops the session token if it is still `stale`.
    ///
    /// A caller holding an outdated token must not discard a session that
    /// another caller has renewed in the meantime.
    pub(crate) async fn invalidate(&self, stale: &str) {
        let mut session = self.state.lock().await;
        if session.sid.as_deref() == Some(stale) {
            debug!("Session rejected by device, clearing it");
            session.sid = None;
        }
    }

    pub(crate) async fn is_authorized(&self) -> bool {
        let session = self.state.lock().await;
        session.sid.is_some() && !session.error
    }

    async fn login(&self, transport: &Transport) -> Result<String, QnapError> {
        let form = self.credentials.form();

        let response = transport.post(LOGIN_PATH, &form, &[]).await?;
        if let Some(sid) = response.as_ref().and_then(session_token) {
            return Ok(sid);
        }

        // Some firmware only accepts the credentials in the query string
        debug!("No session from POST login, retrying with GET");
        let response = transport.get(LOGIN_PATH, &form, &[]).await?;
        response
            .as_ref()
            .and_then(session_token)
            .ok_or_else(|| Auth(format!("Login rejected for user {}", self.credentials.username)))
    }
}

fn session_token(response: &Document) -> Option<String> {
    if response.text("authPassed") == Some("0") {
        return None;
    }
    response.text("authSid").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::normalize;

    #[test]
    fn test_session_token() {
        let passed = normalize(
            "<QDocRoot><authPassed><![CDATA[1]]></authPassed><authSid><![CDATA[12345]]></authSid></QDocRoot>",
            &[],
        )
        .unwrap();
        assert_eq!(Some("12345".to_string()), session_token(&passed));

        let rejected =
            normalize("<QDocRoot><authPassed>0</authPassed><authSid>1</authSid></QDocRoot>", &[])
                .unwrap();
        assert_eq!(None, session_token(&rejected));

        let empty =
            normalize("<QDocRoot><authPassed>1</authPassed><authSid></authSid></QDocRoot>", &[])
                .unwrap();
        assert_eq!(None, session_token(&empty));
    }

    #[tokio::test]
    async fn test_invalidate_keeps_renewed_session() {
        let manager = SessionManager::new(Credentials::new("admin".into(), "secret"));
        manager.state.lock().await.sid = Some("67890".into());

        manager.invalidate("12345").await;
        assert_eq!(Some("67890"), manager.state.lock().await.sid.as_deref());
        assert!(manager.is_authorized().await);

        manager.invalidate("67890").await;
        assert_eq!(None, manager.state.lock().await.sid);
        assert!(!manager.is_authorized().await);
    }

    #[test]
    fn test_credentials_form() {
        let credentials = Credentials::new("admin".into(), "correcthorsebatterystaple");
        assert_eq!(
            [
                ("user", "admin"),
                ("pwd", "Y29ycmVjdGhvcnNlYmF0dGVyeXN0YXBsZQ==")
            ],
            credentials.form()
        );
    }
}
