use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map_res, opt},
    multi::separated_list1,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::model::{ActivityId, GuildId, Participant, ParticipantId, RecordId};

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Record { activity_id: ActivityId, duration_secs: u32, participants: Vec<Participant>, at: Option<u32> },
    Best { activity_id: ActivityId },
    Guild { guild_id: GuildId, activity_id: Option<ActivityId> },
    Member { participant_id: ParticipantId, activity_id: Option<ActivityId> },
    Show { id: RecordId },
    Stats,
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_u16(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |s: &str| s.parse::<u16>())(input)
}

fn parse_u32(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |s: &str| s.parse::<u32>())(input)
}

fn parse_u64(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>())(input)
}

/// `participant:spec` or `participant:spec:guild`
fn parse_participant(input: &str) -> IResult<&str, Participant> {
    let (input, (participant_id, _, spec_id, guild_id)) = tuple((
        parse_u64,
        char(':'),
        parse_u16,
        opt(preceded(char(':'), parse_u32)),
    ))(input)?;
    Ok((input, Participant::new(participant_id, spec_id, guild_id)))
}

fn parse_roster(input: &str) -> IResult<&str, Vec<Participant>> {
    delimited(
        ws(char('[')),
        separated_list1(ws(char(',')), parse_participant),
        ws(char(']')),
    )(input)
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

fn optional_activity(input: &str) -> IResult<&str, Option<ActivityId>> {
    opt(preceded(multispace1, parse_u16))(input)
}

// --- COMMAND PARSERS ---

fn parse_record(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("RECORD")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, activity_id) = parse_u16(input)?;
    let (input, _) = multispace1(input)?;
    let (input, duration_secs) = parse_u32(input)?;
    let (input, participants) = parse_roster(input)?;
    let (input, at) = opt(preceded(ws(tag_ci("AT")), parse_u32))(input)?;
    Ok((input, Command::Record { activity_id, duration_secs, participants, at }))
}

fn parse_best(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("BEST")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, activity_id) = parse_u16(input)?;
    Ok((input, Command::Best { activity_id }))
}

fn parse_guild(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("GUILD")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, guild_id) = parse_u32(input)?;
    let (input, activity_id) = optional_activity(input)?;
    Ok((input, Command::Guild { guild_id, activity_id }))
}

fn parse_member(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("MEMBER")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, participant_id) = parse_u64(input)?;
    let (input, activity_id) = optional_activity(input)?;
    Ok((input, Command::Member { participant_id, activity_id }))
}

fn parse_show(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("SHOW")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, id) = parse_u32(input)?;
    Ok((input, Command::Show { id }))
}

fn parse_stats(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("STATS")(input)?;
    Ok((input, Command::Stats))
}

fn parse_help(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HELP")(input)?;
    Ok((input, Command::Help))
}

fn parse_exit(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("EXIT"), tag_ci("QUIT")))(input)?;
    Ok((input, Command::Exit))
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_record,
        parse_best,
        parse_guild,
        parse_member,
        parse_show,
        parse_stats,
        parse_help,
        parse_exit,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context: String = e.input.chars().take(20).collect();
            let ellipsis = if e.input.chars().count() > 20 { "..." } else { "" };
            Err(format!("Invalid syntax near: '{}{}'", context, ellipsis))
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_with_guild_and_timestamp() {
        let cmd = parse_command("record 960 612 [42:250:7, 43:251] at 1700000000").unwrap();
        assert_eq!(
            cmd,
            Command::Record {
                activity_id: 960,
                duration_secs: 612,
                participants: vec![Participant::new(42, 250, Some(7)), Participant::new(43, 251, None)],
                at: Some(1_700_000_000),
            }
        );
    }

    #[test]
    fn optional_activity_on_scope_queries() {
        assert_eq!(parse_command("GUILD 7").unwrap(), Command::Guild { guild_id: 7, activity_id: None });
        assert_eq!(parse_command("GUILD 7 960").unwrap(), Command::Guild { guild_id: 7, activity_id: Some(960) });
        assert_eq!(
            parse_command("member 42 960").unwrap(),
            Command::Member { participant_id: 42, activity_id: Some(960) }
        );
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("BEST 10").unwrap(), Command::Best { activity_id: 10 });
        assert_eq!(parse_command("show 3").unwrap(), Command::Show { id: 3 });
        assert_eq!(parse_command(" stats ").unwrap(), Command::Stats);
        assert_eq!(parse_command("quit").unwrap(), Command::Exit);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("RECORD 10 200 []").is_err());
        assert!(parse_command("BEST 70000").is_err());
        assert!(parse_command("BEST 10 extra").unwrap_err().starts_with("Unexpected tokens"));
        assert!(parse_command("FROBNICATE").unwrap_err().starts_with("Invalid syntax"));
    }
}
