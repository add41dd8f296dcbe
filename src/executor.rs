use std::env;
use std::ffi::{CStr, CString};
use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr;
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::libc;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult};
use thiserror::Error;
use crate::fieldcode::{self, FieldCodeFlags};
use crate::model::DesktopEntry;

pub const DEFAULT_TERMINAL: &str = "xterm";

/// One launch attempt. Built per activation and consumed by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub template: String,
    pub flags: FieldCodeFlags,
    pub substitution: Option<String>,
    pub wrap_in_terminal: bool,
}

impl ExecutionRequest {
    pub fn for_entry(entry: &DesktopEntry, substitution: Option<String>) -> Self {
        Self {
            template: entry.exec.clone(),
            flags: entry.flags,
            substitution,
            wrap_in_terminal: entry.use_terminal,
        }
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("could not split command '{0}' into shell words")]
    ParseFailed(String),
    #[error("command is empty")]
    EmptyCommand,
    #[error("argument contains a NUL byte: '{0}'")]
    InvalidArgument(String),
    #[error("failed to create process: {0}")]
    SpawnFailed(#[from] nix::Error),
    #[error("intermediate process exited with status {0} before starting the command")]
    DetachFailed(i32),
}

/// Replace the first occurrence of the highest-priority placeholder in
/// `template`. Later occurrences of the same token are left as they are.
pub fn substitute(template: &str, flags: FieldCodeFlags, substitution: &str) -> String {
    match fieldcode::placeholder_token(flags) {
        Some(token) => template.replacen(token, substitution, 1),
        None => template.to_string(),
    }
}

pub fn wrap_in_terminal(command: &str, emulator: &str) -> String {
    format!("{emulator} -e {command}")
}

/// `TERMINAL` wins over the configured emulator, which wins over xterm.
pub fn pick_terminal(env_value: Option<String>, configured: Option<&str>) -> String {
    env_value
        .filter(|t| !t.is_empty())
        .or_else(|| configured.filter(|t| !t.is_empty()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_TERMINAL.to_string())
}

pub fn split_args(command: &str) -> Result<Vec<String>, LaunchError> {
    let argv = shlex::split(command).ok_or_else(|| LaunchError::ParseFailed(command.to_string()))?;
    if argv.is_empty() {
        return Err(LaunchError::EmptyCommand);
    }
    Ok(argv)
}

pub trait Spawner {
    fn spawn(&mut self, argv: &[String]) -> Result<(), LaunchError>;
}

/// Runs the command in a new session through a double fork. Returns once
/// the intermediate process has been reaped; whether `exec` itself
/// succeeded is not observable from here.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSpawner;

impl Spawner for DetachedSpawner {
    fn spawn(&mut self, argv: &[String]) -> Result<(), LaunchError> {
        // Everything the children need is allocated before forking.
        let args = argv
            .iter()
            .map(|a| CString::new(a.as_bytes()).map_err(|_| LaunchError::InvalidArgument(a.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(program) = args.first() else {
            return Err(LaunchError::EmptyCommand);
        };
        let diagnostic = format!("bytestream: command failed: {}\n", argv.join(" "));
        let mut exec_args: Vec<*const libc::c_char> = args.iter().map(|a| a.as_ptr()).collect();
        exec_args.push(ptr::null());
        let dev_null = match OpenOptions::new().read(true).write(true).open("/dev/null") {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Cannot open /dev/null, the command keeps our stdio: {}", e);
                None
            }
        };
        let child_io = ChildIo {
            program: program.as_c_str(),
            exec_args: &exec_args,
            dev_null: dev_null.as_ref().map(AsRawFd::as_raw_fd),
            diagnostic: &diagnostic,
        };

        // SAFETY: the children only make async-signal-safe calls (setsid,
        // fork, dup2, execvp, write, _exit) on buffers prepared above and
        // never allocate.
        match unsafe { unistd::fork() }? {
            ForkResult::Parent { child } => loop {
                match waitpid(child, None) {
                    Ok(WaitStatus::Exited(_, 0)) => return Ok(()),
                    Ok(WaitStatus::Exited(_, code)) => return Err(LaunchError::DetachFailed(code)),
                    Ok(status) => {
                        warn!("Intermediate process ended unexpectedly: {:?}", status);
                        return Err(LaunchError::DetachFailed(-1));
                    }
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(LaunchError::SpawnFailed(e)),
                }
            },
            ForkResult::Child => detach_and_exec(&child_io),
        }
    }
}

/// Pointers and descriptors handed across the fork.
struct ChildIo<'a> {
    program: &'a CStr,
    /// Null-terminated, pointing into the caller's `CString`s.
    exec_args: &'a [*const libc::c_char],
    dev_null: Option<RawFd>,
    diagnostic: &'a str,
}

fn detach_and_exec(io: &ChildIo) -> ! {
    if unistd::setsid().is_err() {
        exit_now(1);
    }

    // SAFETY: see DetachedSpawner::spawn.
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Parent { .. }) => exit_now(0),
        Ok(ForkResult::Child) => {
            // stderr stays attached for the diagnostic below.
            if let Some(fd) = io.dev_null {
                let _ = unistd::dup2(fd, libc::STDIN_FILENO);
                let _ = unistd::dup2(fd, libc::STDOUT_FILENO);
            }
            // SAFETY: `exec_args` is null-terminated and its pointers are
            // borrowed from `args` in the forking frame.
            unsafe { libc::execvp(io.program.as_ptr(), io.exec_args.as_ptr()) };
            let _ = unistd::write(std::io::stderr(), io.diagnostic.as_bytes());
            exit_now(127)
        }
        Err(_) => exit_now(1),
    }
}

fn exit_now(code: i32) -> ! {
    // SAFETY: `_exit` has no preconditions.
    unsafe { libc::_exit(code) }
}

pub struct Executor<S: Spawner = DetachedSpawner> {
    spawner: S,
    terminal: String,
}

impl Executor<DetachedSpawner> {
    pub fn new(configured_terminal: Option<&str>) -> Self {
        Self::with_terminal(
            DetachedSpawner,
            pick_terminal(env::var("TERMINAL").ok(), configured_terminal),
        )
    }
}

impl<S: Spawner> Executor<S> {
    pub fn with_terminal(spawner: S, terminal: String) -> Self {
        Self { spawner, terminal }
    }

    /// Produce the argument vector for `request` without running it.
    pub fn resolve(&self, request: &ExecutionRequest) -> Result<Vec<String>, LaunchError> {
        let substitution = request.substitution.as_deref().unwrap_or("");
        let mut command = substitute(&request.template, request.flags, substitution);
        if request.wrap_in_terminal {
            command = wrap_in_terminal(&command, &self.terminal);
        }
        debug!("Resolved '{}' to '{}'", request.template, command);
        split_args(&command)
    }

    pub fn resolve_and_run(&mut self, request: ExecutionRequest) -> Result<(), LaunchError> {
        let argv = self.resolve(&request)?;
        info!("Launching {:?}", argv);
        self.spawner.spawn(&argv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingSpawner {
        calls: Vec<Vec<String>>,
    }

    impl Spawner for RecordingSpawner {
        fn spawn(&mut self, argv: &[String]) -> Result<(), LaunchError> {
            self.calls.push(argv.to_vec());
            Ok(())
        }
    }

    fn executor() -> Executor<RecordingSpawner> {
        Executor::with_terminal(RecordingSpawner::default(), pick_terminal(None, None))
    }

    fn request(template: &str, flags: FieldCodeFlags, substitution: Option<&str>, terminal: bool) -> ExecutionRequest {
        ExecutionRequest {
            template: template.to_string(),
            flags,
            substitution: substitution.map(str::to_string),
            wrap_in_terminal: terminal,
        }
    }

    #[test]
    fn empty_flags_leave_template_untouched() {
        let template = "app %f --opt='a b'";
        assert_eq!(substitute(template, FieldCodeFlags::empty(), "x"), template);
    }

    #[test]
    fn substitutes_placeholder() {
        assert_eq!(substitute("app %f", FieldCodeFlags::SINGLE_FILE, "/tmp/a.txt"), "app /tmp/a.txt");
    }

    #[test]
    fn fast_path_removes_placeholder() {
        assert_eq!(substitute("app %f", FieldCodeFlags::SINGLE_FILE, ""), "app ");
    }

    #[test]
    fn missing_placeholder_is_passthrough() {
        assert_eq!(substitute("app", FieldCodeFlags::SINGLE_FILE, "x"), "app");
    }

    #[test]
    fn only_first_occurrence_is_replaced() {
        assert_eq!(substitute("diff %f %f", FieldCodeFlags::SINGLE_FILE, "a"), "diff a %f");
    }

    #[test]
    fn priority_picks_one_kind() {
        let flags = FieldCodeFlags::MULTI_FILE | FieldCodeFlags::SINGLE_URL;
        assert_eq!(substitute("cmd %F %u", flags, "x"), "cmd x %u");
    }

    #[test]
    fn occurrence_is_textual() {
        // The analyzer skips `%%f`, but token lookup is a plain text search.
        assert_eq!(substitute("echo %%f %f", FieldCodeFlags::SINGLE_FILE, "x"), "echo %x %f");
    }

    #[test]
    fn terminal_selection() {
        assert_eq!(pick_terminal(None, None), "xterm");
        assert_eq!(pick_terminal(Some(String::new()), None), "xterm");
        assert_eq!(pick_terminal(None, Some("foot")), "foot");
        assert_eq!(pick_terminal(Some("kitty".into()), Some("foot")), "kitty");
    }

    #[test]
    fn wraps_in_default_terminal() {
        let terminal = pick_terminal(None, None);
        assert_eq!(wrap_in_terminal("vim file.txt", &terminal), "xterm -e vim file.txt");

        let argv = executor()
            .resolve(&request("vim %f", FieldCodeFlags::SINGLE_FILE, Some("file.txt"), true))
            .unwrap();
        assert_eq!(argv, ["xterm", "-e", "vim", "file.txt"]);
    }

    #[test]
    fn splits_with_shell_quoting() {
        assert_eq!(
            split_args(r#"sh -c "echo 'a b'" c\ d"#).unwrap(),
            ["sh", "-c", "echo 'a b'", "c d"]
        );
    }

    #[test]
    fn parse_failure_never_spawns() {
        let mut exec = executor();
        let result = exec.resolve_and_run(request("app 'unterminated", FieldCodeFlags::empty(), None, false));
        assert!(matches!(result, Err(LaunchError::ParseFailed(_))));
        assert!(exec.spawner.calls.is_empty());
    }

    #[test]
    fn quoting_in_substitution_can_fail() {
        let mut exec = executor();
        let result = exec.resolve_and_run(request("app %f", FieldCodeFlags::SINGLE_FILE, Some("\"oops"), false));
        assert!(matches!(result, Err(LaunchError::ParseFailed(_))));
        assert!(exec.spawner.calls.is_empty());
    }

    #[test]
    fn empty_command_is_rejected() {
        let mut exec = executor();
        let result = exec.resolve_and_run(request("%f", FieldCodeFlags::SINGLE_FILE, None, false));
        assert!(matches!(result, Err(LaunchError::EmptyCommand)));
        assert!(exec.spawner.calls.is_empty());
    }

    #[test]
    fn entry_reaches_spawner_with_substituted_argv() {
        let entry = DesktopEntry::new("cat.desktop".into(), "Cat".into(), "cat %f".into(), false);
        assert_eq!(entry.flags, FieldCodeFlags::SINGLE_FILE);

        let mut exec = executor();
        exec.resolve_and_run(ExecutionRequest::for_entry(&entry, Some("/etc/hosts".into())))
            .unwrap();
        assert_eq!(exec.spawner.calls, vec![vec!["cat".to_string(), "/etc/hosts".to_string()]]);
    }

    #[test]
    fn nul_byte_is_rejected_before_fork() {
        let result = DetachedSpawner.spawn(&["a\0b".to_string()]);
        assert!(matches!(result, Err(LaunchError::InvalidArgument(_))));
    }

    #[test]
    fn detached_spawn_returns_after_reaping_intermediate() {
        // The grandchild fails to exec; that failure stays invisible.
        let result = DetachedSpawner.spawn(&["/nonexistent/bytestream-test-binary".to_string()]);
        assert!(result.is_ok());
    }

    #[test]
    fn detached_command_runs_in_new_session_with_null_stdin() {
        let tmp = tempdir().unwrap();
        let out = tmp.path().join("report");
        // Field 6 of /proc/<pid>/stat is the session id.
        let script = format!(
            "read -r _ _ _ _ _ sid _ < /proc/$$/stat; \
             {{ echo \"$sid\"; readlink /proc/self/fd/0; }} > {0}.part && mv {0}.part {0}",
            out.display()
        );
        DetachedSpawner.spawn(&["sh".to_string(), "-c".to_string(), script]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !out.exists() {
            assert!(Instant::now() < deadline, "detached command never wrote {:?}", out);
            thread::sleep(Duration::from_millis(20));
        }

        let report = fs::read_to_string(&out).unwrap();
        let mut lines = report.lines();
        let sid: i32 = lines.next().unwrap().trim().parse().unwrap();
        assert_ne!(sid, unistd::getsid(None).unwrap().as_raw());
        assert_eq!(lines.next(), Some("/dev/null"));
    }
}
