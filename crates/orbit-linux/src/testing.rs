//! Scripted command runner for adapter tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use orbit_platform::command::{CommandError, CommandOutput, CommandRunner, RunOptions};

#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub options: RunOptions,
}

type Reply = Result<CommandOutput, CommandError>;

/// Replies are matched by program name in the order they were queued.
/// A program with nothing queued gets an empty successful output.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<Vec<(String, VecDeque<Reply>)>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, program: &str, stdout: &str) -> Self {
        self.push(
            program,
            Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        )
    }

    pub fn fail(self, program: &str, code: i32, stderr: &str) -> Self {
        self.push(
            program,
            Err(CommandError::exit(program, Some(code), String::new(), stderr.to_string())),
        )
    }

    pub fn fail_with(self, program: &str, err: CommandError) -> Self {
        self.push(program, Err(err))
    }

    fn push(self, program: &str, reply: Reply) -> Self {
        {
            let mut replies = self.replies.lock().unwrap();
            match replies.iter_mut().find(|(p, _)| p == program) {
                Some((_, queue)) => queue.push_back(reply),
                None => replies.push((program.to_string(), VecDeque::from([reply]))),
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls().into_iter().filter(|c| c.program == program).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: RunOptions,
    ) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            options,
        });
        let mut replies = self.replies.lock().unwrap();
        replies
            .iter_mut()
            .find(|(p, _)| p == program)
            .and_then(|(_, queue)| queue.pop_front())
            .unwrap_or_else(|| Ok(CommandOutput::default()))
    }
}
