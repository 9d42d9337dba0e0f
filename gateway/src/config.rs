//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Arguments {
    #[arg(
        value_name = "PORT",
        help = "Port number to listen on",
        required_unless_present = "port"
    )]
    pub port_argument: Option<u16>,

    #[arg(
        short = 'p',
        long = "port",
        value_name = "PORT",
        help = "Port number to listen on",
        conflicts_with = "port_argument"
    )]
    pub port: Option<u16>,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "COUNT",
        help = "Number of worker threads (0 for autodetect)",
        default_value_t = 0
    )]
    pub threads: usize,
}

impl Arguments {
    /// The listening port, from either the positional or the named form
    pub fn port(&self) -> u16 {
        self.port.or(self.port_argument).unwrap_or_default()
    }

    /// Worker pool size: the explicit count, or detected hardware
    /// parallelism with a floor of one
    pub fn concurrency(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1)
        } else {
            self.threads
        }
    }
}
