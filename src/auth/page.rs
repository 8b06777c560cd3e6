use quick_xml::escape::escape;

use crate::convert::Tool;

/// Message shown beside one of the two forms.
pub enum Notice<'a> {
    Signup(&'a str),
    Login(&'a str),
}

/// Landing page: tool picker for everyone, the session user's name or the
/// signup/login forms for anonymous visitors.
pub fn landing_page(user: Option<&str>, notice: Option<Notice<'_>>) -> String {
    let options: String = Tool::ALL
        .iter()
        .map(|tool| format!(r#"<option value="{0}">{0}</option>"#, tool.id()))
        .collect();

    let account = match user {
        Some(name) => format!(
            r#"<p>Signed in as <strong>{}</strong>. <a href="/logout">Log out</a></p>"#,
            escape(name)
        ),
        None => {
            let (signup_error, login_error) = match notice {
                Some(Notice::Signup(msg)) => (error_line(msg), String::new()),
                Some(Notice::Login(msg)) => (String::new(), error_line(msg)),
                None => (String::new(), String::new()),
            };
            format!(
                r#"<section><h2>Sign up</h2>{}<form method="post" action="/auth"><input type="hidden" name="type" value="signup"><input name="username" placeholder="Username" required><input name="email" type="email" placeholder="Email"><input name="password" type="password" placeholder="Password" required><button>Sign up</button></form></section>
<section><h2>Log in</h2>{}<form method="post" action="/auth"><input type="hidden" name="type" value="login"><input name="username" placeholder="Username" required><input name="password" type="password" placeholder="Password" required><button>Log in</button></form></section>"#,
                signup_error, login_error
            )
        }
    };

    format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Convertly</title></head>
<body>
<h1>Convertly</h1>
{}
<section><h2>Convert</h2><form method="post" action="/convert" enctype="multipart/form-data"><select name="tool">{}</select><input type="file" name="files" multiple required><button>Convert</button></form></section>
</body></html>"#,
        account, options
    )
}

fn error_line(msg: &str) -> String {
    format!(r#"<p class="error">{}</p>"#, escape(msg))
}
