//! Diagnostic commands

use crate::client::BrokerClient;
use crate::output::{print_reply, OutputFormat};
use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use logonbroker_common::protocol::{ChangePasswordRequest, LogMessage, LoginRequest};
use logonbroker_common::{LoginReason, SessionId};

/// Login reason as accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum ReasonArg {
    #[default]
    Login,
    Credui,
    Parse,
}

impl From<ReasonArg> for LoginReason {
    fn from(reason: ReasonArg) -> Self {
        match reason {
            ReasonArg::Login => LoginReason::Login,
            ReasonArg::Credui => LoginReason::CredUI,
            ReasonArg::Parse => LoginReason::Parse,
        }
    }
}

#[derive(Args)]
pub struct LoginArgs {
    /// Username
    pub username: String,

    /// Password
    #[arg(short, long, default_value = "")]
    pub password: String,

    /// Session the login is for
    #[arg(short, long, default_value = "0")]
    pub session: u32,

    /// Why the login is submitted
    #[arg(short, long, value_enum, default_value = "login")]
    pub reason: ReasonArg,
}

#[derive(Args)]
pub struct ChangePasswordArgs {
    /// Username
    pub username: String,

    /// Session holding the identity
    pub session: u32,

    /// Current password
    #[arg(long)]
    pub old: String,

    /// New password
    #[arg(long)]
    pub new: String,

    /// Account domain
    #[arg(short, long, default_value = "")]
    pub domain: String,
}

#[derive(Args)]
pub struct LogArgs {
    /// Level: info, debug, warn or error
    pub level: String,

    /// Message text
    pub message: String,

    /// Logger name reported to the broker
    #[arg(long, default_value = "logonbroker-cli")]
    pub logger: String,
}

pub async fn hello(client: &mut BrokerClient) -> Result<()> {
    client.hello().await?;
    println!("{}", "Broker is responding".green());
    Ok(())
}

pub async fn login(client: &mut BrokerClient, args: LoginArgs, format: OutputFormat) -> Result<()> {
    let response = client
        .login(LoginRequest {
            username: args.username,
            password: args.password,
            session: SessionId(args.session),
            reason: args.reason.into(),
        })
        .await?;
    print_reply(&response, format)
}

pub async fn user_info(client: &mut BrokerClient, session: u32, format: OutputFormat) -> Result<()> {
    let response = client.user_info(SessionId(session)).await?;
    print_reply(&response, format)
}

pub async fn label(client: &mut BrokerClient, name: String, format: OutputFormat) -> Result<()> {
    let response = client.dyn_label(name).await?;
    print_reply(&response, format)
}

pub async fn change_password(
    client: &mut BrokerClient,
    args: ChangePasswordArgs,
    format: OutputFormat,
) -> Result<()> {
    let response = client
        .change_password(ChangePasswordRequest {
            username: args.username,
            domain: args.domain,
            old_password: args.old,
            new_password: args.new,
            session: SessionId(args.session),
        })
        .await?;
    print_reply(&response, format)
}

pub async fn log(client: &mut BrokerClient, args: LogArgs) -> Result<()> {
    client
        .log(LogMessage {
            logger_name: args.logger,
            level: args.level,
            logged_message: args.message,
        })
        .await?;
    println!("{}", "Logged".green());
    Ok(())
}
