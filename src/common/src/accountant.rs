// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use tokio::sync::mpsc;

use crate::types::Timestamp;

/// One counter observation, delivered to whoever aggregates telemetry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterSample {
    pub timestamp: Timestamp,
    pub name: String,
    pub value: u64,
}

/// A clone-able handle for reporting counter samples. Delivery is
/// best-effort: samples to a closed receiver are dropped silently.
#[derive(Clone, Debug)]
pub struct Accountant {
    tx: mpsc::UnboundedSender<CounterSample>,
}

impl Accountant {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CounterSample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn announce(&self, name: impl Into<String>, value: u64) {
        let sample = CounterSample {
            timestamp: Timestamp::now(),
            name: name.into(),
            value,
        };
        let _ = self.tx.send(sample);
    }
}
