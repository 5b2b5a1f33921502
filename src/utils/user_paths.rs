use std::path::{Path, PathBuf};

/// Expands a leading `~` in key paths supplied by operators
/// (`~/.ssh/id_rsa`, `JUMPHOST_KEY_PATH=~/keys/bastion`).
pub fn expand_home_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Some(str_path) = path.to_str() else {
        return path.to_path_buf();
    };
    let Ok(home) = std::env::var("HOME") else {
        return path.to_path_buf();
    };
    if let Some(rest) = str_path.strip_prefix("~/") {
        return PathBuf::from(home).join(rest);
    }
    if str_path == "~" {
        return PathBuf::from(home);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::expand_home_path;
    use std::path::PathBuf;

    #[test]
    fn leaves_absolute_paths_untouched() {
        assert_eq!(
            expand_home_path("/etc/netshow/bastion_key"),
            PathBuf::from("/etc/netshow/bastion_key")
        );
    }

    #[test]
    fn leaves_tilde_user_paths_untouched() {
        assert_eq!(expand_home_path("~admin/key"), PathBuf::from("~admin/key"));
    }
}
