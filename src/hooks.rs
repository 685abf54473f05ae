// src/hooks.rs

//! Hook-script execution for package install/deinstall
//!
//! A bundle may carry four lua scripts plus the classic shell hooks
//! (`+INSTALL`, `+DEINSTALL`) and an mtree skeleton. Execution order:
//! pre-install lua, `pkg-install PRE-INSTALL`, ...materialize...,
//! post-install lua, `pkg-install POST-INSTALL`; the deinstall side mirrors
//! it. All scripts receive `PKG_PREFIX`, `PKG_NAME`, and `PKG_VERSION` in
//! the environment, run with stdin nulled, and are killed after a timeout.
//!
//! The engine requires these capabilities but does not own them: every spawn
//! goes through the `SystemCommand` trait.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::callbacks::SystemCommand;
use crate::error::{Error, Result};

/// Lua hook script names carried in the bundle metadata directory
pub const LUA_PRE_INSTALL: &str = "pkg-pre-install.lua";
pub const LUA_POST_INSTALL: &str = "pkg-post-install.lua";
pub const LUA_PRE_DEINSTALL: &str = "pkg-pre-deinstall.lua";
pub const LUA_POST_DEINSTALL: &str = "pkg-post-deinstall.lua";

/// Shell hook script names
pub const PKG_INSTALL_FILE: &str = "+INSTALL";
pub const PKG_DEINSTALL_FILE: &str = "+DEINSTALL";
pub const MTREE_FILE: &str = "+MTREE";
pub const MESSAGE_FILE: &str = "+MESSAGE";

/// All metadata files a bundle may carry besides the stub database
pub const METAFILES: &[&str] = &[
    MTREE_FILE,
    PKG_INSTALL_FILE,
    PKG_DEINSTALL_FILE,
    MESSAGE_FILE,
    LUA_PRE_INSTALL,
    LUA_POST_INSTALL,
    LUA_PRE_DEINSTALL,
    LUA_POST_DEINSTALL,
];

/// Lua hook phases, in execution order relative to materialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaPhase {
    PreInstall,
    PostInstall,
    PreDeinstall,
    PostDeinstall,
}

impl LuaPhase {
    pub fn filename(&self) -> &'static str {
        match self {
            Self::PreInstall => LUA_PRE_INSTALL,
            Self::PostInstall => LUA_POST_INSTALL,
            Self::PreDeinstall => LUA_PRE_DEINSTALL,
            Self::PostDeinstall => LUA_POST_DEINSTALL,
        }
    }
}

impl fmt::Display for LuaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filename())
    }
}

/// Executor for one package's hooks, bound to its infrastructure directory
pub struct HookRunner<'a> {
    system: &'a dyn SystemCommand,
    infra_dir: PathBuf,
    name: String,
    version: String,
    prefix: String,
}

impl<'a> HookRunner<'a> {
    pub fn new(
        system: &'a dyn SystemCommand,
        infra_dir: PathBuf,
        name: &str,
        version: &str,
        prefix: &str,
    ) -> Self {
        Self {
            system,
            infra_dir,
            name: name.to_string(),
            version: version.to_string(),
            prefix: prefix.to_string(),
        }
    }

    fn hook_env(&self) -> [(&str, &str); 3] {
        [
            ("PKG_PREFIX", self.prefix.as_str()),
            ("PKG_NAME", self.name.as_str()),
            ("PKG_VERSION", self.version.as_str()),
        ]
    }

    /// Run a lua hook if present. Absence is not an error; a non-zero exit
    /// is `HookNonZero`.
    pub fn run_lua(&self, phase: LuaPhase) -> Result<()> {
        let script = self.infra_dir.join(phase.filename());
        if !script.exists() {
            debug!("No {} for {}-{}", phase, self.name, self.version);
            return Ok(());
        }

        info!("Running {} for {}-{}", phase, self.name, self.version);

        let script_str = script.to_string_lossy().to_string();
        let status = self.system.run(
            &["/usr/local/bin/lua", &script_str],
            &self.hook_env(),
            Some(Path::new(&self.prefix)),
        )?;

        if status != 0 {
            return Err(Error::HookNonZero {
                hook: phase.to_string(),
                status,
            });
        }
        Ok(())
    }

    /// Run the `+INSTALL` shell hook with the given mode argument
    /// (`PRE-INSTALL` or `POST-INSTALL`).
    pub fn run_pkg_install(&self, mode: &str) -> Result<()> {
        self.run_shell_hook(PKG_INSTALL_FILE, mode)
    }

    /// Run the `+DEINSTALL` shell hook with the given mode argument
    /// (`DEINSTALL` or `POST-DEINSTALL`).
    pub fn run_pkg_deinstall(&self, mode: &str) -> Result<()> {
        self.run_shell_hook(PKG_DEINSTALL_FILE, mode)
    }

    fn run_shell_hook(&self, file: &str, mode: &str) -> Result<()> {
        let script = self.infra_dir.join(file);
        if !script.exists() {
            return Ok(());
        }

        info!("Running {file} {mode} for {}-{}", self.name, self.version);

        let script_str = script.to_string_lossy().to_string();
        let status = self.system.run(
            &["/bin/sh", &script_str, &self.name, mode],
            &self.hook_env(),
            Some(Path::new(&self.prefix)),
        )?;

        if status != 0 {
            return Err(Error::HookNonZero {
                hook: format!("{file} {mode}"),
                status,
            });
        }
        Ok(())
    }

    /// Apply the bundled mtree directory skeleton against the prefix.
    pub fn run_mtree(&self, mtree_path: &Path) -> Result<()> {
        if !mtree_path.exists() {
            return Ok(());
        }

        let mtree_str = mtree_path.to_string_lossy().to_string();
        let status = self.system.run(
            &[
                "/usr/sbin/mtree",
                "-U",
                "-f",
                &mtree_str,
                "-d",
                "-e",
                "-p",
                &self.prefix,
            ],
            &self.hook_env(),
            None,
        )?;

        if status != 0 {
            return Err(Error::HookNonZero {
                hook: "mtree".to_string(),
                status,
            });
        }
        Ok(())
    }
}

/// Substitute the classic exec placeholders into a command string:
/// `%F` absolute file path, `%D` current directory, `%B` basename.
pub fn substitute_exec(command: &str, file: &str, cwd: &str) -> String {
    let basename = Path::new(file)
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();

    command
        .replace("%F", file)
        .replace("%D", cwd)
        .replace("%B", &basename)
}

/// Run an `@exec`-family command through the shell after placeholder
/// substitution.
pub fn run_asset_exec(
    system: &dyn SystemCommand,
    command: &str,
    cwd: &str,
    file: &str,
) -> Result<()> {
    let expanded = substitute_exec(command, file, cwd);
    debug!("exec: {expanded}");

    let status = system.run(&["/bin/sh", "-c", &expanded], &[], Some(Path::new(cwd)))?;
    if status != 0 {
        return Err(Error::HookNonZero {
            hook: expanded,
            status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::RecordingCommand;
    use std::fs;

    #[test]
    fn test_substitute_exec() {
        assert_eq!(
            substitute_exec("%D/bin/setup %F", "/usr/local/etc/app.conf", "/usr/local"),
            "/usr/local/bin/setup /usr/local/etc/app.conf"
        );
        assert_eq!(
            substitute_exec("register %B", "/usr/local/bin/vim", "/usr/local"),
            "register vim"
        );
    }

    #[test]
    fn test_missing_lua_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let system = RecordingCommand::new();
        let runner = HookRunner::new(
            &system,
            dir.path().to_path_buf(),
            "foo",
            "1.0",
            "/usr/local",
        );

        runner.run_lua(LuaPhase::PreInstall).unwrap();
        assert!(system.calls().is_empty());
    }

    #[test]
    fn test_lua_invocation_shape() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LUA_PRE_INSTALL), "-- hook").unwrap();

        let system = RecordingCommand::new();
        let runner = HookRunner::new(
            &system,
            dir.path().to_path_buf(),
            "foo",
            "1.0",
            "/usr/local",
        );
        runner.run_lua(LuaPhase::PreInstall).unwrap();

        let calls = system.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], "/usr/local/bin/lua");
        assert!(calls[0][1].ends_with(LUA_PRE_INSTALL));
    }

    #[test]
    fn test_pkg_install_invocation_shape() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PKG_INSTALL_FILE), "#!/bin/sh\nexit 0").unwrap();

        let system = RecordingCommand::new();
        let runner = HookRunner::new(
            &system,
            dir.path().to_path_buf(),
            "foo",
            "1.0",
            "/usr/local",
        );
        runner.run_pkg_install("PRE-INSTALL").unwrap();

        let calls = system.calls();
        assert_eq!(calls[0][0], "/bin/sh");
        assert_eq!(calls[0][2], "foo");
        assert_eq!(calls[0][3], "PRE-INSTALL");
    }

    #[test]
    fn test_exec_runs_through_shell() {
        let system = RecordingCommand::new();
        run_asset_exec(&system, "touch %B", "/tmp", "/tmp/flag").unwrap();

        let calls = system.calls();
        assert_eq!(calls[0], vec!["/bin/sh", "-c", "touch flag"]);
    }
}
