use std::sync::Mutex;

use anyhow::Result;
use futures::future::BoxFuture;
use rdbatch::{BatchProcessor, BatchRequest, ProcessExit};
use tokio::sync::mpsc;

/// Replays canned output, one script per invocation. Invocations past the
/// last script replay it again.
pub struct ReplayProcessor {
    runs: Vec<(Vec<String>, i32)>,
    requests: Mutex<Vec<BatchRequest>>,
}

impl ReplayProcessor {
    pub fn new() -> Self {
        Self {
            runs: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then(mut self, lines: &[&str], code: i32) -> Self {
        self.runs
            .push((lines.iter().map(|line| line.to_string()).collect(), code));
        self
    }

    pub fn requests(&self) -> Vec<BatchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl BatchProcessor for ReplayProcessor {
    fn run<'a>(
        &'a self,
        request: &'a BatchRequest,
        lines: mpsc::Sender<String>,
    ) -> BoxFuture<'a, Result<ProcessExit>> {
        Box::pin(async move {
            let index = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.len() - 1
            };
            let Some((output, code)) = self.runs.get(index).or(self.runs.last()) else {
                return Ok(ProcessExit::success());
            };
            for line in output {
                lines.send(line.clone()).await?;
            }
            Ok(ProcessExit::with_code(*code))
        })
    }
}
