// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Function actor: one spawned function process and its IPC connection.
//!
//! Lifecycle: `Registered` (address reserved, command built) → `Started`
//! (process launched) → `Connected` (handshake done, frames may flow) →
//! `Stopped`. Messages delivered before the handshake wait for it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::unix::OwnedWriteHalf;
use tokio::process::{Child, Command};
use tokio::sync::watch;

use super::Actor;
use crate::codec::write_frame;
use crate::error::{SpawnError, SwitchyardError, SwitchyardResult};
use crate::output::{forward_lines, OutputSink, OutputStream};
use crate::proto::{Message, Startup};
use crate::types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionPhase {
    Registered,
    Started,
    Connected,
    Stopped,
}

/// Everything needed to build a [`Function`] once its address is known.
pub struct FunctionSpec {
    pub name: String,
    pub command: Command,
    pub startup: Startup,
    pub handshake_timeout: Option<Duration>,
    pub output: Arc<dyn OutputSink>,
}

pub struct Function {
    addr: Address,
    parent: Address,
    name: String,
    command: Mutex<Option<Command>>,
    child: Mutex<Option<Child>>,
    conn: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    phase: watch::Sender<FunctionPhase>,
    startup: Startup,
    handshake_timeout: Option<Duration>,
    output: Arc<dyn OutputSink>,
}

impl Function {
    pub fn new(addr: Address, parent: Address, spec: FunctionSpec) -> Arc<Self> {
        let (phase, _) = watch::channel(FunctionPhase::Registered);
        Arc::new(Self {
            addr,
            parent,
            name: spec.name,
            command: Mutex::new(Some(spec.command)),
            child: Mutex::new(None),
            conn: tokio::sync::Mutex::new(None),
            phase,
            startup: spec.startup,
            handshake_timeout: spec.handshake_timeout,
            output: spec.output,
        })
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn parent(&self) -> Address {
        self.parent
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn startup(&self) -> &Startup {
        &self.startup
    }

    pub fn phase(&self) -> FunctionPhase {
        *self.phase.borrow()
    }

    /// The framed reply sent once the process identifies itself.
    pub fn handshake_message(&self) -> Message {
        Message::handshake(self.addr, self.parent, self.startup.clone())
    }

    /// Launch the process. Its stdout and stderr are forwarded line by line
    /// to the output sink, labelled with the function's name.
    pub fn start(&self) -> Result<(), SpawnError> {
        let mut command = self
            .command
            .lock()
            .take()
            .ok_or(SpawnError::AlreadyStarted(self.addr))?;

        command
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| SpawnError::LaunchFailed {
            name: self.name.clone(),
            executable: command.as_std().get_program().to_string_lossy().into_owned(),
            source,
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(
                self.name.clone(),
                OutputStream::Stdout,
                stdout,
                Arc::clone(&self.output),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(
                self.name.clone(),
                OutputStream::Stderr,
                stderr,
                Arc::clone(&self.output),
            ));
        }

        tracing::debug!(
            address = %self.addr,
            function = %self.name,
            pid = ?child.id(),
            "Function process started"
        );

        *self.child.lock() = Some(child);
        self.phase.send_if_modified(|phase| {
            if *phase == FunctionPhase::Registered {
                *phase = FunctionPhase::Started;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    /// Complete the handshake on `conn`: send the handshake reply, then make
    /// the connection this function's live channel and release waiting
    /// deliveries.
    pub async fn connect(&self, mut conn: OwnedWriteHalf) -> SwitchyardResult<()> {
        let mut slot = self.conn.lock().await;
        match self.phase() {
            FunctionPhase::Connected => return Err(SwitchyardError::AlreadyConnected(self.addr)),
            FunctionPhase::Stopped => return Err(SwitchyardError::FunctionStopped(self.addr)),
            _ => {}
        }

        write_frame(&mut conn, &self.handshake_message()).await?;
        *slot = Some(conn);
        self.phase.send_replace(FunctionPhase::Connected);

        tracing::debug!(address = %self.addr, function = %self.name, "Function connected");
        Ok(())
    }

    /// Exit code of the process if it has already terminated.
    pub fn exit_code(&self) -> Option<i32> {
        let mut child = self.child.lock();
        let status = child.as_mut()?.try_wait().ok()??;
        Some(status.code().unwrap_or(-1))
    }

    /// Signal the process to terminate. Deliveries still waiting for the
    /// handshake give up. A kill failure is logged, not returned.
    pub fn stop(&self) {
        self.command.lock().take();
        self.phase.send_replace(FunctionPhase::Stopped);

        if let Some(child) = self.child.lock().as_mut() {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
            if let Err(e) = child.start_kill() {
                tracing::warn!(
                    address = %self.addr,
                    function = %self.name,
                    error = %e,
                    "Failed to kill function process"
                );
            }
        }
    }

    async fn wait_connected(&self) -> SwitchyardResult<()> {
        let mut rx = self.phase.subscribe();
        let started = Instant::now();
        let wait = rx.wait_for(|phase| {
            matches!(phase, FunctionPhase::Connected | FunctionPhase::Stopped)
        });

        let reached = match self.handshake_timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result.map(|phase| *phase).ok(),
                Err(_) => {
                    return Err(SwitchyardError::Timeout {
                        what: "function handshake",
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    })
                }
            },
            None => wait.await.map(|phase| *phase).ok(),
        };

        match reached {
            Some(FunctionPhase::Connected) => Ok(()),
            _ => Err(SwitchyardError::FunctionStopped(self.addr)),
        }
    }
}

#[async_trait]
impl Actor for Function {
    fn address(&self) -> Address {
        self.addr
    }

    async fn deliver(&self, msg: Message) {
        if let Err(e) = self.wait_connected().await {
            tracing::warn!(
                address = %self.addr,
                function = %self.name,
                from = %msg.from_addr(),
                error = %e,
                "Message to function dropped"
            );
            crate::metrics::MESSAGES_DROPPED.inc();
            return;
        }

        let mut conn = self.conn.lock().await;
        let Some(writer) = conn.as_mut() else {
            return;
        };
        if let Err(e) = write_frame(writer, &msg).await {
            tracing::warn!(
                address = %self.addr,
                function = %self.name,
                error = %e,
                "Failed to write message to function"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_frame;
    use crate::output::MemorySink;
    use crate::proto::MessageKind;
    use tokio::net::UnixStream;

    fn spec(program: &str, args: &[&str], sink: Arc<MemorySink>) -> FunctionSpec {
        let mut command = Command::new(program);
        command.args(args);
        FunctionSpec {
            name: "function.test".to_string(),
            command,
            startup: Startup {
                module: "/artifacts/test.out".to_string(),
                ..Default::default()
            },
            handshake_timeout: None,
            output: sink,
        }
    }

    fn function(spec: FunctionSpec) -> Arc<Function> {
        Function::new(Address::new(0xabc), Address::new(0xdef), spec)
    }

    #[tokio::test]
    async fn test_deliver_waits_for_handshake() {
        let func = function(spec("true", &[], Arc::new(MemorySink::new())));
        let (server, mut client) = UnixStream::pair().unwrap();
        let (_, write_half) = server.into_split();

        let delivery = {
            let func = Arc::clone(&func);
            tokio::spawn(async move {
                func.deliver(Message::routed(func.address(), Address::new(1), b"early".to_vec()))
                    .await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!delivery.is_finished());

        func.connect(write_half).await.unwrap();
        assert_eq!(func.phase(), FunctionPhase::Connected);
        delivery.await.unwrap();

        let handshake: Message = read_frame(&mut client).await.unwrap();
        assert_eq!(handshake.kind(), MessageKind::Handshake);
        assert_eq!(handshake.your_address, 0xabc);
        assert_eq!(handshake.parent_address, 0xdef);
        assert_eq!(
            handshake.startup.unwrap().module,
            "/artifacts/test.out"
        );

        let data: Message = read_frame(&mut client).await.unwrap();
        assert_eq!(data.data, b"early");
    }

    #[tokio::test]
    async fn test_second_handshake_rejected() {
        let func = function(spec("true", &[], Arc::new(MemorySink::new())));
        let (first, _keep_first) = UnixStream::pair().unwrap();
        let (second, _keep_second) = UnixStream::pair().unwrap();

        func.connect(first.into_split().1).await.unwrap();
        assert!(matches!(
            func.connect(second.into_split().1).await,
            Err(SwitchyardError::AlreadyConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_handshake_timeout_drops_message() {
        let mut spec = spec("true", &[], Arc::new(MemorySink::new()));
        spec.handshake_timeout = Some(Duration::from_millis(30));
        let func = function(spec);

        let delivered = tokio::time::timeout(
            Duration::from_secs(2),
            func.deliver(Message::routed(func.address(), Address::new(1), vec![1])),
        )
        .await;
        assert!(delivered.is_ok());
    }

    #[tokio::test]
    async fn test_stop_releases_waiting_delivery() {
        let func = function(spec("true", &[], Arc::new(MemorySink::new())));
        let delivery = {
            let func = Arc::clone(&func);
            tokio::spawn(async move {
                func.deliver(Message::routed(func.address(), Address::new(1), vec![1]))
                    .await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        func.stop();

        tokio::time::timeout(Duration::from_secs(2), delivery)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(func.phase(), FunctionPhase::Stopped);
    }

    #[tokio::test]
    async fn test_start_missing_executable() {
        let func = function(spec(
            "/nonexistent/switchyard-wrapper",
            &[],
            Arc::new(MemorySink::new()),
        ));
        match func.start() {
            Err(SpawnError::LaunchFailed { executable, .. }) => {
                assert_eq!(executable, "/nonexistent/switchyard-wrapper")
            }
            other => panic!("expected launch failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let func = function(spec("true", &[], Arc::new(MemorySink::new())));
        func.start().unwrap();
        assert_eq!(func.phase(), FunctionPhase::Started);
        assert!(matches!(func.start(), Err(SpawnError::AlreadyStarted(_))));
        func.stop();
    }

    #[tokio::test]
    async fn test_output_lines_are_labelled() {
        let sink = Arc::new(MemorySink::new());
        let func = function(spec(
            "sh",
            &["-c", "echo hello; echo oops >&2"],
            Arc::clone(&sink),
        ));
        func.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.lines().len() < 2 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            sink.lines_on(OutputStream::Stdout),
            vec!["[function.test]: hello"]
        );
        assert_eq!(
            sink.lines_on(OutputStream::Stderr),
            vec!["[function.test]: oops"]
        );
    }

    #[tokio::test]
    async fn test_binary_output_does_not_kill_function() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let script = format!(
            "printf 'a\\377b\\n'; sleep 0.2; echo after; echo done > {}",
            marker.display()
        );
        let sink = Arc::new(MemorySink::new());
        let func = function(spec("sh", &["-c", script.as_str()], Arc::clone(&sink)));
        func.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while (sink.lines().len() < 2 || !marker.exists()) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            sink.lines_on(OutputStream::Stdout),
            vec!["[function.test]: a\u{fffd}b", "[function.test]: after"]
        );
        assert!(marker.exists());
    }
}
