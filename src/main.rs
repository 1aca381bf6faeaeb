// Copyright 2025 Edge Kube Authors.
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

use clap::Parser;
use colored::Colorize;
use edge_kube::cli::commands::{CliArgs, Commands, CreateCommands, DeleteCommands};
use edge_kube::Result;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = CliArgs::parse();

    let result: Result<()> = match args.command {
        Commands::Create(create) => match create {
            CreateCommands::Cluster(cmd) => cmd.execute().await,
            CreateCommands::Registry(cmd) => cmd.execute().await,
            CreateCommands::Odf(cmd) => cmd.execute().await,
            CreateCommands::Metallb(cmd) => cmd.execute().await,
            CreateCommands::Lso(cmd) => cmd.execute().await,
            CreateCommands::Ui(cmd) => cmd.execute().await,
            CreateCommands::Mirror(cmd) => cmd.execute().await,
            CreateCommands::Icsp(cmd) => cmd.execute().await,
        },
        Commands::Delete(delete) => match delete {
            DeleteCommands::Cluster(cmd) => cmd.execute().await,
            DeleteCommands::Registry(cmd) => cmd.execute().await,
            DeleteCommands::Metallb(cmd) => cmd.execute().await,
            DeleteCommands::Ui(cmd) => cmd.execute().await,
            DeleteCommands::Mirror(cmd) => cmd.execute().await,
        },
    };

    if let Err(e) = result {
        eprintln!("{}", format!("Error: {}", e).red());
        std::process::exit(e.code());
    }
}
