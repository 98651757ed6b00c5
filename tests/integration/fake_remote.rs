//! A scripted stand-in for ssh and the remote sqlite3 CLI.
//!
//! The executor is pointed at `/bin/sh <dir>/ssh.sh` instead of `ssh`. That
//! script records its arguments and then becomes `<dir>/engine.sh`, so the
//! spawned process is the fake engine itself and killing it kills the
//! engine.

use std::path::PathBuf;
use std::time::Duration;

use litexplore::query::{QueryExecutor, StreamingResultReader};
use litexplore::remote::{ChannelManager, RemoteTarget, SshSettings};
use tempfile::TempDir;

pub struct FakeRemote {
    dir: TempDir,
}

impl FakeRemote {
    /// Creates a fake remote that runs `engine` as a shell script.
    ///
    /// The script can write into `$DIR`.
    pub fn new(engine: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();

        std::fs::write(
            dir.path().join("engine.sh"),
            format!("DIR='{root}'\n{engine}\n"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("ssh.sh"),
            format!(
                r#"DIR='{root}'
case " $* " in
  *" -O exit "*) printf '%s\n' "$*" >> "$DIR/master_exit"; exit 0 ;;
esac
printf '%s\n' "$@" > "$DIR/args"
for last; do :; done
printf '%s\n' "$last" > "$DIR/remote_cmd"
exec /bin/sh "$DIR/engine.sh"
"#
            ),
        )
        .unwrap();

        Self { dir }
    }

    pub fn ssh_settings(&self) -> SshSettings {
        SshSettings {
            command: vec![
                "/bin/sh".to_string(),
                self.path("ssh.sh").display().to_string(),
            ],
            ..SshSettings::default()
        }
    }

    pub fn executor(&self, row_cap: usize, time_budget: Duration) -> QueryExecutor {
        let channels = ChannelManager::new(self.ssh_settings()).unwrap();
        QueryExecutor::new(channels, StreamingResultReader::new(row_cap, time_budget))
    }

    pub fn default_executor(&self) -> QueryExecutor {
        self.executor(100, Duration::from_secs(10))
    }

    pub fn target(&self) -> RemoteTarget {
        RemoteTarget::new("db-box", "/srv/app.sqlite", "sqlite3").unwrap()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Returns a file the scripts wrote, if they did.
    pub fn read(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.path(name)).ok()
    }

    /// Returns the ssh arguments of the last invocation.
    pub fn ssh_args(&self) -> Vec<String> {
        self.read("args")
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Waits until a script has written `name`.
    pub async fn wait_for(&self, name: &str) {
        for _ in 0..500 {
            if self.path(name).exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("fake remote never wrote {name}");
    }

    /// Returns the pid the engine recorded with `echo $$ > "$DIR/pid"`.
    pub fn engine_pid(&self) -> u32 {
        self.read("pid").unwrap().trim().parse().unwrap()
    }
}

/// Returns true if a process with this pid still exists.
pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(format!("kill -0 {pid} 2>/dev/null"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
