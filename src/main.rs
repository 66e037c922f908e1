/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use benchrig::clap_args::{self, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = clap_args::parse();

    match args.command {
        Commands::Run(opts) => {
            benchrig::init_subscriber(benchrig::get_subscriber(opts.verbose))?;
            benchrig::run(&opts).await?;
        }

        Commands::List { files, filter } => {
            benchrig::init_subscriber(benchrig::get_subscriber(false))?;
            println!("{}", benchrig::list(&files, &filter)?);
        }

        Commands::Init { path } => benchrig::init(&path)?,
    }

    Ok(())
}
