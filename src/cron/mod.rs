// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Cron management: schedule codec, crontab editing and the cron service

pub mod api;
pub mod crontab;
pub mod schedule;
