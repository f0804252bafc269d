// Copyright 2025 zncdata-labs
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

use argo_workflow_operator::build;
use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "argo-workflow-op")]
#[command(version = build::PKG_VERSION)]
#[command(about = "Argo Workflows Kubernetes Operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Output CRDs in YAML
    Crd {
        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Output the operator ClusterRole in YAML
    Rbac {
        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Run the controller
    Server {
        /// Only watch ArgoWorkFlows in this namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Delay before a failed reconcile is retried
        #[arg(long, default_value_t = 5)]
        requeue_seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crd { file } => argo_workflow_operator::crd(file).await?,
        Commands::Rbac { file } => argo_workflow_operator::rbac(file).await?,
        Commands::Server {
            namespace,
            requeue_seconds,
        } => argo_workflow_operator::run(namespace, Duration::from_secs(requeue_seconds)).await?,
    }

    Ok(())
}
