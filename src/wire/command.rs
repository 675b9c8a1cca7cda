use std::fmt;

/// An outgoing command: an ordered argument list, verb first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<String>,
}

impl Command {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            args: vec![verb.into()],
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn push(&mut self, arg: impl ToString) {
        self.args.push(arg.to_string());
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn verb(&self) -> &str {
        &self.args[0]
    }

    /// The same arguments as a client command, verb first.
    pub fn to_redis(&self) -> redis::Cmd {
        let mut cmd = redis::Cmd::new();
        for arg in &self.args {
            cmd.arg(arg.as_str());
        }
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}
