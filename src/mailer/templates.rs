use anyhow::{anyhow, bail};
use serde_json::Value;

pub const USER_WELCOME: &str = "user_welcome";
pub const TOKEN_ACTIVATION: &str = "token_activation";
pub const TOKEN_PASSWORD_RESET: &str = "token_password_reset";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub text: String,
    pub html: String,
}

fn field(data: &Value, key: &str) -> anyhow::Result<String> {
    match data.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(anyhow!("template data is missing {key:?}")),
    }
}

fn html(paragraphs: &[String]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
    format!(
        "<!doctype html><html><head><meta name=\"viewport\" content=\"width=device-width\" />\
         <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" /></head>\
         <body>{body}</body></html>"
    )
}

fn activation_request(token: &str) -> String {
    format!("{{\"token\": \"{token}\"}}")
}

pub fn render(template: &str, data: &Value) -> anyhow::Result<Rendered> {
    let (subject, paragraphs) = match template {
        USER_WELCOME => {
            let user_id = field(data, "userID")?;
            let token = field(data, "activationToken")?;
            (
                "Welcome to Greenlight!".to_string(),
                vec![
                    "Hi,".to_string(),
                    format!("Thanks for signing up for a Greenlight account. Your user ID number is {user_id}."),
                    "Please send a request to the `PUT /v1/users/activated` endpoint with the following JSON body to activate your account:".to_string(),
                    activation_request(&token),
                    "Please note that this is a one-time use token and it will expire in 3 days.".to_string(),
                    "Thanks,".to_string(),
                    "The Greenlight Team".to_string(),
                ],
            )
        }
        TOKEN_ACTIVATION => {
            let token = field(data, "activationToken")?;
            (
                "Activate your Greenlight account".to_string(),
                vec![
                    "Hi,".to_string(),
                    "Please send a `PUT /v1/users/activated` request with the following JSON body to activate your account:".to_string(),
                    activation_request(&token),
                    "Please note that this is a one-time use token and it will expire in 3 days.".to_string(),
                    "Thanks,".to_string(),
                    "The Greenlight Team".to_string(),
                ],
            )
        }
        TOKEN_PASSWORD_RESET => {
            let token = field(data, "passwordResetToken")?;
            (
                "Reset your Greenlight password".to_string(),
                vec![
                    "Hi,".to_string(),
                    "Please send a `PUT /v1/users/password` request with the following JSON body to set a new password:".to_string(),
                    format!("{{\"password\": \"your new password\", \"token\": \"{token}\"}}"),
                    "Please note that this is a one-time use token and it will expire in 45 minutes. If you need another token please make a `POST /v1/tokens/password-reset` request.".to_string(),
                    "Thanks,".to_string(),
                    "The Greenlight Team".to_string(),
                ],
            )
        }
        other => bail!("unknown mail template {other:?}"),
    };

    Ok(Rendered {
        subject,
        text: paragraphs.join("\n\n"),
        html: html(&paragraphs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn welcome_mentions_token_and_user() {
        let r = render(
            USER_WELCOME,
            &json!({"activationToken": "ABCDEFGHIJKLMNOPQRSTUVWXYZ", "userID": 7}),
        )
        .unwrap();
        assert_eq!(r.subject, "Welcome to Greenlight!");
        assert!(r.text.contains("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
        assert!(r.text.contains("user ID number is 7"));
        assert!(r.html.starts_with("<!doctype html>"));
    }

    #[test]
    fn unknown_template_and_missing_data_fail() {
        assert!(render("newsletter", &json!({})).is_err());
        assert!(render(TOKEN_PASSWORD_RESET, &json!({"activationToken": "x"})).is_err());
    }
}
