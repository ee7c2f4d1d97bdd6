use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use recflow::{config::DEFAULT_CONFIG_PATH, files, Config, Renamer};
use std::path::{Path, PathBuf};

/// Apply the recording naming rules to files already on disk
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File or directory to rename; directories are walked recursively
    #[arg(short, long)]
    path: PathBuf,

    /// Print what would be renamed without touching anything
    #[arg(long)]
    dry_run: bool,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env().format_timestamp_secs().init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let cfg = Config::load_config(Some(&config_path)).context("Failed to load configuration")?;
    let renamer = Renamer::from_config(&cfg.rename);

    // Rules only apply to absolute paths
    let root = args
        .path
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", args.path.display()))?;

    let targets = if root.is_dir() {
        files::media_files(&root)
    } else {
        vec![root]
    };
    info!("Found {} file(s) to check", targets.len());

    let mut renamed = 0;
    for path in &targets {
        match rename_file(&renamer, path, args.dry_run) {
            Ok(Some(dest)) => {
                println!("{} -> {}", path.display(), dest.display());
                renamed += 1;
            }
            Ok(None) => debug!("Unchanged: {}", path.display()),
            Err(e) => warn!("Failed to rename {}: {:#}", path.display(), e),
        }
    }

    info!(
        "{} {} of {} file(s)",
        if args.dry_run { "Would rename" } else { "Renamed" },
        renamed,
        targets.len()
    );
    Ok(())
}

/// Rename one file in place. Returns the new path, or `None` if the name is already right.
fn rename_file(renamer: &Renamer, path: &Path, dry_run: bool) -> Result<Option<PathBuf>> {
    let dest = PathBuf::from(renamer.rename(&path.to_string_lossy()));
    if dest == path {
        return Ok(None);
    }
    if dry_run {
        return Ok(Some(dest));
    }

    if dest.exists() {
        anyhow::bail!("destination already exists: {}", dest.display());
    }
    files::move_into_place(path, &dest)?;

    // The move already happened, a leftover directory is only worth a warning
    if let Some(dir) = path.parent() {
        if !dest.starts_with(dir) {
            match files::remove_dir_if_empty(dir) {
                Ok(true) => info!("Removed empty directory {}", dir.display()),
                Ok(false) => {}
                Err(e) => warn!("Failed to remove directory {}: {:#}", dir.display(), e),
            }
        }
    }
    Ok(Some(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recflow::config::{RenameConfig, RenameRule};

    fn renamer() -> Renamer {
        Renamer::from_config(&RenameConfig {
            rules: vec![RenameRule {
                old: "^Old Show/".to_string(),
                new: "New Show/".to_string(),
            }],
            ..Default::default()
        })
    }

    #[test]
    fn test_rename_moves_file_and_removes_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let show = dir.path().join("Old Show");
        std::fs::create_dir_all(&show).unwrap();
        let source = show.join("Old Show.ts");
        std::fs::write(&source, b"data").unwrap();

        let dest = rename_file(&renamer(), &source, false).unwrap().unwrap();

        assert_eq!(dest, dir.path().join("New Show").join("Old Show.ts"));
        assert!(dest.exists());
        assert!(!source.exists());
        assert!(!show.exists());
    }

    #[test]
    fn test_directory_cleanup_failure_still_reports_rename() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let show = dir.path().join("Old Show");
        std::fs::create_dir_all(&show).unwrap();
        let source = show.join("Old Show.ts");
        std::fs::write(&source, b"data").unwrap();

        // Entries can't be removed from a read-only parent
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();
        let writable = std::fs::create_dir(dir.path().join("write-check")).is_ok();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
        if writable {
            // Running as root, permissions are not enforced
            return;
        }

        std::fs::create_dir_all(dir.path().join("New Show")).unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();

        let result = rename_file(&renamer(), &source, false);
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        let dest = result.unwrap().unwrap();
        assert_eq!(dest, dir.path().join("New Show").join("Old Show.ts"));
        assert!(dest.exists());
        assert!(show.exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let show = dir.path().join("Old Show");
        std::fs::create_dir_all(&show).unwrap();
        let source = show.join("Old Show.ts");
        std::fs::write(&source, b"data").unwrap();

        let dest = rename_file(&renamer(), &source, true).unwrap();

        assert!(dest.is_some());
        assert!(source.exists());
        assert!(!dir.path().join("New Show").exists());
    }

    #[test]
    fn test_unchanged_name_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Plain.ts");
        std::fs::write(&source, b"data").unwrap();

        assert!(rename_file(&Renamer::default(), &source, false).unwrap().is_none());
        assert!(source.exists());
    }
}
