#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use hive::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

pub const SENDER: &str = "sender";

pub fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

pub fn from_sender(to: &Address, msg: impl Message) -> Envelope {
    Envelope::new(addr("sender:test"), to.clone(), msg)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Start a runtime whose messages for `sender:*` end up in the returned receiver.
pub fn start(store: Arc<dyn Store>) -> (Runtime, UnboundedReceiver<Envelope>) {
    start_as("runner", store)
}

pub fn start_as(prefix: &str, store: Arc<dyn Store>) -> (Runtime, UnboundedReceiver<Envelope>) {
    init_tracing();

    let config = RuntimeConfig {
        prefix: prefix.to_string(),
        workers: 2,
        poll_interval: Duration::from_millis(10),
    };
    let runtime = Runtime::start(config, store).unwrap();

    let (shuttle, rx) = ChannelShuttle::new(SENDER);
    runtime.shuttles().insert(Arc::new(shuttle));

    (runtime, rx)
}

pub async fn recv(rx: &mut UnboundedReceiver<Envelope>) -> String {
    let envelope = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no reply within 5s")
        .expect("shuttle closed");

    envelope
        .message
        .downcast_ref::<String>()
        .cloned()
        .expect("reply should be a string")
}

pub async fn assert_silent(rx: &mut UnboundedReceiver<Envelope>) {
    let res = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(res.is_err(), "unexpected reply: {res:?}");
}

/// Replies `echo <n>:<msg>` to every string, finishing after `limit` replies.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Echo {
    pub counter: u64,
    pub limit: Option<u64>,
}

#[impl_id("8f2b6a10-4c3e-4b7d-a1e9-5d0c7f3e9b01")]
impl Coroutine for Echo {
    fn resume(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<Step> {
        let Some(msg) = ctx.message_as::<String>().cloned() else {
            return Ok(Step::Suspend);
        };

        let to = ctx.source().clone();
        ctx.out(to, format!("echo {}:{msg}", self.counter))?;
        self.counter += 1;

        match self.limit {
            Some(limit) if self.counter >= limit => Ok(Step::Complete),
            _ => Ok(Step::Suspend),
        }
    }
}

/// Spawns child `level1` on "setup", then frames messages for it.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Framing {
    returning: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Greeter;

#[impl_id("8f2b6a10-4c3e-4b7d-a1e9-5d0c7f3e9b02")]
impl Coroutine for Framing {
    fn resume(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<Step> {
        let Some(msg) = ctx.message_as::<String>().cloned() else {
            return Ok(Step::Suspend);
        };

        if ctx.is_addressed() {
            if msg == "setup" {
                ctx.intercept(true);
                ctx.child("level1", Greeter, vec![])?;
            }
            return Ok(Step::Suspend);
        }

        let to = ctx.source().clone();
        if self.returning {
            ctx.out(to, format!("post-{msg} from main!"))?;
        } else {
            ctx.out(to, format!("pre-{msg} from main!"))?;
            ctx.mode(SuspendMode::ForwardAndReturn);
        }
        self.returning = !self.returning;

        Ok(Step::Suspend)
    }
}

#[impl_id("8f2b6a10-4c3e-4b7d-a1e9-5d0c7f3e9b03")]
impl Coroutine for Greeter {
    fn resume(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<Step> {
        if let Some(msg) = ctx.message_as::<String>().cloned() {
            let to = ctx.source().clone();
            ctx.out(to, format!("{msg} from child!"))?;
        }
        Ok(Step::Suspend)
    }
}

/// Echoes forever until an `i32` trips its hook.
#[derive(Debug, Serialize, Deserialize)]
pub struct Looper;

#[derive(Debug, Serialize, Deserialize)]
pub struct SawInteger;

#[impl_id("8f2b6a10-4c3e-4b7d-a1e9-5d0c7f3e9b04")]
impl Coroutine for Looper {
    fn resume(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<Step> {
        match ctx.message_as::<String>().cloned() {
            Some(msg) if msg == "arm" => ctx.shortcircuit_on::<i32>(SawInteger),
            Some(msg) => {
                let to = ctx.source().clone();
                ctx.out(to, format!("loop {msg}"))?;
            }
            None => {}
        }
        Ok(Step::Suspend)
    }
}

#[impl_id("8f2b6a10-4c3e-4b7d-a1e9-5d0c7f3e9b05")]
impl Shortcircuit for SawInteger {
    fn call(&self, ctx: &mut Context<'_>) -> anyhow::Result<ShortcircuitAction> {
        let to = ctx.source().clone();
        ctx.out(to, "saw integer".to_string())?;
        Ok(ShortcircuitAction::Terminate)
    }
}

/// Reports `tick <n>` to whoever said "start" each time its checkpoint fires.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Ticker {
    reply_to: Option<Address>,
    ticks: u64,
}

#[impl_id("8f2b6a10-4c3e-4b7d-a1e9-5d0c7f3e9b06")]
impl Coroutine for Ticker {
    fn resume(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<Step> {
        let Some(msg) = ctx.message_as::<String>().cloned() else {
            return Ok(Step::Suspend);
        };

        match msg.as_str() {
            "start" => {
                let to = ctx.source().clone();
                ctx.checkpoint("tick".to_string(), Duration::from_millis(100))?;
                ctx.out(to.clone(), "armed".to_string())?;
                self.reply_to = Some(to);
            }
            "tick" if ctx.source() == ctx.address() => {
                if let Some(to) = self.reply_to.clone() {
                    ctx.out(to, format!("tick {}", self.ticks))?;
                }
                self.ticks += 1;
                if self.ticks >= 2 {
                    ctx.clear_checkpoint();
                }
            }
            _ => {}
        }

        Ok(Step::Suspend)
    }
}

/// Forwards strings from outside to `target` and relays the answers back.
#[derive(Debug, Serialize, Deserialize)]
pub struct Relay {
    pub target: Option<Address>,
    pub reply_to: Option<Address>,
}

#[impl_id("8f2b6a10-4c3e-4b7d-a1e9-5d0c7f3e9b07")]
impl Coroutine for Relay {
    fn resume(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<Step> {
        let Some(msg) = ctx.message_as::<String>().cloned() else {
            return Ok(Step::Suspend);
        };

        if ctx.source().element(0) == Some(SENDER) {
            // Without a target, spawn a sibling root to talk to
            let target = match self.target.clone() {
                Some(target) => target,
                None => {
                    let target = ctx.root("clone", Echo::default(), vec![])?;
                    self.target = Some(target.clone());
                    target
                }
            };

            self.reply_to = Some(ctx.source().clone());
            ctx.out(target, msg)?;
        } else if let Some(to) = self.reply_to.clone() {
            ctx.out(to, format!("relayed {msg}"))?;
        }

        Ok(Step::Suspend)
    }
}
