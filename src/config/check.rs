//! Startup diagnostics for the settings document

use std::path::Path;

use serde_yaml::Value;
use tracing::{info, warn};

use super::settings::{AppSettings, PathList};

fn section_has(settings: &AppSettings, section: &str, key: &str) -> bool {
    settings
        .extra
        .get(section)
        .and_then(|s| s.get(key))
        .is_some_and(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
}

fn check_dirs(label: &str, paths: Option<&PathList>, required: bool, problems: &mut Vec<String>) {
    let paths = paths.map(PathList::to_vec).unwrap_or_default();
    if paths.is_empty() {
        if required {
            problems.push(format!("No {} library directory configured", label));
        }
        return;
    }
    for path in paths {
        if !Path::new(&path).exists() {
            problems.push(format!("{} library directory does not exist: {}", label, path));
        }
    }
}

/// Log what is missing or inconsistent. Returns the warnings for callers that
/// want to surface them.
pub fn check_settings(settings: &AppSettings) -> Vec<String> {
    let mut problems = Vec::new();
    let app = &settings.app;

    match app.logtype.as_deref() {
        Some("server") if app.logserver.as_deref().unwrap_or_default().is_empty() => {
            problems.push("Log type is server but no log server is configured".to_string())
        }
        Some("file") if app.logpath.as_deref().unwrap_or_default().is_empty() => {
            problems.push("Log type is file but no log path is configured".to_string())
        }
        Some(logtype) => info!(logtype, "Log output configured"),
        None => {}
    }

    if app.web_port.is_none() {
        info!("Web port not set, using 3000");
    }

    let has_user = app.login_user.as_deref().is_some_and(|u| !u.is_empty());
    let has_password = app.login_password.as_deref().is_some_and(|p| !p.is_empty());
    if !has_user || !has_password {
        problems.push("Admin user or password not set, using admin / password".to_string());
    }

    match (app.ssl_cert.as_deref(), app.ssl_key.as_deref()) {
        (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => {
            if !Path::new(cert).exists() {
                problems.push(format!("ssl_cert file does not exist: {}", cert));
            }
            if !Path::new(key).exists() {
                problems.push(format!("ssl_key file does not exist: {}", key));
            }
        }
        _ => info!(port = settings.web_port(), "HTTPS not enabled"),
    }

    if app.rmt_tmdbkey.as_deref().unwrap_or_default().is_empty() {
        problems.push("TMDB API key not configured, identification will not work".to_string());
    }

    let match_mode = app
        .rmt_match_mode
        .as_deref()
        .map(str::to_uppercase)
        .unwrap_or_else(|| "NORMAL".to_string());
    let mode = if match_mode == "STRICT" { "strict" } else { "normal" };
    info!(mode, "TMDB match mode");

    let media = &settings.media;
    if let Some(server) = media.media_server.as_deref().filter(|s| !s.is_empty()) {
        let complete = match server {
            "jellyfin" => section_has(settings, "jellyfin", "host") && section_has(settings, "jellyfin", "api_key"),
            "plex" => section_has(settings, "plex", "token") || section_has(settings, "plex", "username"),
            _ => section_has(settings, "emby", "host") && section_has(settings, "emby", "api_key"),
        };
        if !complete {
            problems.push(format!("Media server {} is not fully configured", server));
        }
    }

    check_dirs("movie", media.movie_path.as_ref(), true, &mut problems);
    check_dirs("tv", media.tv_path.as_ref(), true, &mut problems);
    check_dirs("anime", media.anime_path.as_ref(), false, &mut problems);

    if media.category.as_deref().unwrap_or_default().is_empty() {
        problems.push("No category policy configured".to_string());
    }

    for problem in &problems {
        warn!("{}", problem);
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_reports_missing_basics() {
        let problems = check_settings(&AppSettings::default());
        assert!(problems.iter().any(|p| p.contains("TMDB API key")));
        assert!(problems.iter().any(|p| p.contains("movie library")));
        assert!(problems.iter().any(|p| p.contains("category")));
        assert!(!problems.iter().any(|p| p.contains("anime")));
    }

    #[test]
    fn test_media_server_completeness() {
        let settings = AppSettings::from_yaml(
            r#"
media:
  media_server: plex
plex:
  username: me
"#,
        )
        .unwrap();
        let problems = check_settings(&settings);
        assert!(!problems.iter().any(|p| p.contains("Media server")));

        let settings = AppSettings::from_yaml("media:\n  media_server: jellyfin\n").unwrap();
        let problems = check_settings(&settings);
        assert!(problems.iter().any(|p| p.contains("jellyfin")));
    }

    #[test]
    fn test_existing_directories_pass() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AppSettings::default();
        settings.media.movie_path = Some(PathList::One(dir.path().display().to_string()));
        settings.media.tv_path = Some(PathList::One("/definitely/not/here".to_string()));
        let problems = check_settings(&settings);
        assert!(!problems.iter().any(|p| p.starts_with("movie")));
        assert!(problems.iter().any(|p| p.contains("/definitely/not/here")));
    }
}
