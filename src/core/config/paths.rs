use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub sessions_file: PathBuf,
    pub history_dir: PathBuf,
    pub vector_store_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let user_data_dir = discover_user_data_dir(&project_root);
        Self::rooted_at(project_root, user_data_dir)
    }

    /// Lay out all app paths under one directory. Used by tests and by
    /// deployments that pin the data directory via environment.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self::rooted_at(data_dir.clone(), data_dir)
    }

    fn rooted_at(project_root: PathBuf, user_data_dir: PathBuf) -> Self {
        let log_dir = user_data_dir.join("logs");
        let sessions_file = user_data_dir.join("sessions.json");
        let history_dir = user_data_dir.join("conversation_histories").join("sessions");
        let vector_store_dir = user_data_dir.join("vector_stores");

        for dir in [&user_data_dir, &log_dir, &history_dir, &vector_store_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            user_data_dir,
            log_dir,
            sessions_file,
            history_dir,
            vector_store_dir,
        }
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("DOCUCHAT_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.toml").exists() {
        return manifest_dir;
    }

    env::current_dir().unwrap_or(manifest_dir)
}

fn discover_user_data_dir(project_root: &std::path::Path) -> PathBuf {
    if let Ok(dir) = env::var("DOCUCHAT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return project_root.to_path_buf();
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Docuchat");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("Docuchat");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("docuchat")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
