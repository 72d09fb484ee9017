//! Actors: an OS thread paired with an `inproc://` PAIR pipe.
//!
//! Every long-lived component runs as an actor. The supervisor holds one end
//! of the pipe and drives the actor with two commands; the actor multiplexes
//! the pipe into its own readiness loop.
//!
//! Pipe protocol:
//!
//! - supervisor → actor: [`CMD_TICK`] (1 Hz), [`CMD_TERM`] (shut down)
//! - actor → supervisor: a single readiness frame once its sockets are bound
//!
//! [`Actor::spawn`] does not return until the readiness frame arrives, so by
//! the time the supervisor continues, the actor's endpoints are connectable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use tracing::error;

/// Supervisor-sourced 1 Hz notification.
pub const CMD_TICK: &str = "tick";

/// Cooperative termination command.
pub const CMD_TERM: &str = "$TERM";

const READY_SIGNAL: &[u8] = &[0x01];

static PIPE_NONCE: AtomicU64 = AtomicU64::new(0);

/// The actor-side end of the control pipe.
pub struct Pipe {
    socket: zmq::Socket,
}

impl Pipe {
    /// Tell the supervisor that sockets are set up and the loop is about to
    /// start. Must be sent exactly once, before the first blocking read.
    pub fn signal_ready(&self) -> Result<()> {
        self.socket.send(READY_SIGNAL, 0)?;
        Ok(())
    }

    /// Receive the next command from the supervisor. Blocks.
    pub fn recv_command(&self) -> Result<String> {
        let bytes = self.socket.recv_bytes(0)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The underlying PAIR socket, for inclusion in a poll set.
    pub fn socket(&self) -> &zmq::Socket {
        &self.socket
    }
}

/// Supervisor-side handle to a running actor.
pub struct Actor {
    name: String,
    pipe: zmq::Socket,
    handle: Option<JoinHandle<()>>,
}

impl Actor {
    /// Spawn `body` on its own thread, wired to the supervisor via an inproc
    /// PAIR pipe. Blocks until the body signals readiness.
    pub fn spawn<F>(ctx: &zmq::Context, name: &str, body: F) -> Result<Actor>
    where
        F: FnOnce(Pipe) -> Result<()> + Send + 'static,
    {
        let endpoint = format!(
            "inproc://pipe-{}-{}",
            name,
            PIPE_NONCE.fetch_add(1, Ordering::Relaxed)
        );
        let pipe = ctx.socket(zmq::PAIR)?;
        pipe.set_linger(0)?;
        pipe.bind(&endpoint)
            .with_context(|| format!("failed to bind actor pipe {endpoint}"))?;

        let thread_ctx = ctx.clone();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let run = move || -> Result<()> {
                    let socket = thread_ctx.socket(zmq::PAIR)?;
                    socket.set_linger(0)?;
                    socket.connect(&endpoint)?;
                    body(Pipe { socket })
                };
                if let Err(err) = run() {
                    error!("{thread_name}: actor failed: {err:#}");
                }
            })
            .context("failed to spawn actor thread")?;

        // Block until the body signals readiness. The timeout turns a body
        // that failed during socket setup into an error instead of a hang.
        pipe.set_rcvtimeo(5_000)?;
        pipe.recv_bytes(0)
            .with_context(|| format!("actor {name} died before signalling readiness"))?;
        pipe.set_rcvtimeo(-1)?;

        Ok(Actor {
            name: name.to_string(),
            pipe,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a command down the pipe.
    pub fn send(&self, cmd: &str) -> Result<()> {
        self.pipe
            .send(cmd, 0)
            .with_context(|| format!("failed to send {cmd:?} to actor {}", self.name))
    }

    /// Send `$TERM` and join the thread.
    pub fn terminate(mut self) -> Result<()> {
        self.send(CMD_TERM)?;
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("actor {} panicked", self.name))?;
        }
        Ok(())
    }
}
