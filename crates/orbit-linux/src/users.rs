//! Local accounts from the passwd database, managed with the shadow utilities.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use orbit_platform::command::{argv, CommandRunner, RunOptions};
use orbit_platform::users::{NewUserOptions, SystemUser, UserAccounts, FIRST_REGULAR_UID, NOLOGIN_SHELLS};
use orbit_platform::validate;

const NEVER_LOGGED_IN: &str = "**Never logged in**";

// Column layout of `lastlog` output
const LASTLOG_USER_WIDTH: usize = 16;
const LASTLOG_LATEST_COLUMN: usize = 38;

pub struct PasswdUserAccounts {
    runner: Arc<dyn CommandRunner>,
}

impl PasswdUserAccounts {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn logged_in(&self) -> HashSet<String> {
        match self.runner.run("who", &[], RunOptions::default()).await {
            Ok(out) => out
                .stdout
                .lines()
                .filter_map(|l| l.split_whitespace().next())
                .map(String::from)
                .collect(),
            Err(e) => {
                debug!("who failed: {}", e);
                HashSet::new()
            }
        }
    }

    async fn last_logins(&self) -> HashMap<String, Option<String>> {
        let range = format!("{}-65000", FIRST_REGULAR_UID);
        match self
            .runner
            .run("lastlog", &argv(["-u", range.as_str()]), RunOptions::default())
            .await
        {
            Ok(out) => parse_lastlog(&out.stdout),
            Err(e) => {
                debug!("lastlog failed: {}", e);
                HashMap::new()
            }
        }
    }

    async fn admin(&self, program: &str, args: Vec<String>, what: String) -> Result<()> {
        info!("{}", what);
        self.runner
            .run(program, &args, RunOptions::elevated())
            .await
            .with_context(|| format!("{} failed", what))?;
        Ok(())
    }
}

#[async_trait]
impl UserAccounts for PasswdUserAccounts {
    async fn list(&self) -> Result<Vec<SystemUser>> {
        let getent_args = argv(["passwd"]);
        let (passwd, logged_in, last_logins) = tokio::join!(
            self.runner.run("getent", &getent_args, RunOptions::default()),
            self.logged_in(),
            self.last_logins(),
        );
        let passwd = passwd.context("getent passwd failed")?;

        Ok(passwd
            .stdout
            .lines()
            .filter_map(parse_passwd_line)
            .filter(|u| u.uid >= FIRST_REGULAR_UID && u.username != "nobody")
            .map(|mut user| {
                user.logged_in = logged_in.contains(&user.username);
                user.last_login = last_logins.get(&user.username).cloned().flatten();
                user
            })
            .collect())
    }

    async fn set_locked(&self, username: &str, locked: bool) -> Result<()> {
        validate::username(username)?;
        let flag = if locked { "-l" } else { "-u" };
        let verb = if locked { "lock" } else { "unlock" };
        self.admin("passwd", argv([flag, username]), format!("{} user {}", verb, username))
            .await
    }

    async fn delete(&self, username: &str) -> Result<()> {
        validate::username(username)?;
        self.admin("userdel", argv(["-r", username]), format!("delete user {}", username))
            .await
    }

    async fn create(&self, username: &str, options: &NewUserOptions) -> Result<()> {
        validate::username(username)?;

        let mut args = argv(["-m"]);
        if let Some(shell) = options.shell.as_deref().filter(|s| !s.is_empty()) {
            validate::absolute_path(shell)?;
            args.extend(argv(["-s", shell]));
        }
        if let Some(home) = options.home.as_deref().filter(|h| !h.is_empty()) {
            validate::absolute_path(home)?;
            args.extend(argv(["-d", home]));
        }
        args.push(username.to_string());

        self.admin("useradd", args, format!("create user {}", username))
            .await
    }

    async fn change_password(&self, username: &str, password: &str) -> Result<()> {
        validate::username(username)?;
        validate::password(password)?;

        info!("change password for {}", username);
        let payload = format!("{}:{}\n", username, password);
        self.runner
            .run("chpasswd", &[], RunOptions::elevated().with_stdin(payload))
            .await
            .with_context(|| format!("change password for {} failed", username))?;
        Ok(())
    }
}

/// `name:password:uid:gid:gecos:home:shell`; anything else is skipped.
fn parse_passwd_line(line: &str) -> Option<SystemUser> {
    let fields: Vec<&str> = line.split(':').collect();
    let [username, _, uid, gid, gecos, home, shell] = fields.as_slice() else {
        return None;
    };
    let shell = shell.trim();

    Some(SystemUser {
        username: username.to_string(),
        uid: uid.parse().ok()?,
        gid: gid.parse().ok()?,
        gecos: (!gecos.is_empty()).then(|| gecos.to_string()),
        home: home.to_string(),
        shell: shell.to_string(),
        locked: NOLOGIN_SHELLS.contains(&shell),
        logged_in: false,
        last_login: None,
    })
}

fn parse_lastlog(stdout: &str) -> HashMap<String, Option<String>> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let username: String = line.chars().take(LASTLOG_USER_WIDTH).collect();
            let username = username.trim();
            if username.is_empty() {
                return None;
            }
            let latest: String = line.chars().skip(LASTLOG_LATEST_COLUMN).collect();
            let latest = latest.trim();
            let last_login = (!latest.is_empty() && latest != NEVER_LOGGED_IN).then(|| latest.to_string());
            Some((username.to_string(), last_login))
        })
        .collect()
}
