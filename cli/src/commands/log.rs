use anyhow::{Context, Result, bail};

use glyco_core::models::ReadingInput;
use glyco_core::service::GlucoseService;

use super::helpers::parse_date;
use super::history::print_history;

pub(crate) struct LogArgs {
    pub date: Option<String>,
    pub fasting: Option<f64>,
    pub postprandial: Option<f64>,
    pub bedtime: Option<f64>,
    pub merge: bool,
    pub json: bool,
}

pub(crate) fn cmd_log(svc: &GlucoseService, args: LogArgs) -> Result<()> {
    if args.fasting.is_none() && args.postprandial.is_none() && args.bedtime.is_none() {
        bail!("Nothing to log. Pass at least one of --fasting, --postprandial, --bedtime");
    }

    let date = parse_date(args.date)?;
    let mut input = ReadingInput {
        date,
        fasting: args.fasting,
        postprandial: args.postprandial,
        bedtime: args.bedtime,
    };
    if args.merge {
        if let Some(existing) = svc.day(date)? {
            input = input.merged_with(&existing);
        }
    }

    let submission = svc.submit(&input)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&submission)?);
    } else {
        println!("{}", submission.message);
    }

    // The readings are saved at this point; only the redraw can still fail.
    let history = submission
        .history
        .context("Readings saved, but the history could not be reloaded")?;
    if !args.json {
        println!();
        print_history(&history);
    }

    Ok(())
}
