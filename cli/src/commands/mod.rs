mod helpers;
mod history;
mod log;
mod transfer;

pub(crate) use history::{cmd_day, cmd_show};
pub(crate) use log::{LogArgs, cmd_log};
pub(crate) use transfer::{cmd_export, cmd_import};
