use crate::cmd::{parse_json, DeleteArgs, GetArgs, Session, SetArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_value, print_variables};

pub fn get(args: GetArgs, session: &Session) -> CliResult<i32> {
    let client = session.connect()?;
    let value = client
        .get_system_variable(&args.name)
        .map_err(|err| client_error("getSystemVariable failed", err))?;
    print_value(&value, session.format);
    Ok(SUCCESS)
}

pub fn set(args: SetArgs, session: &Session) -> CliResult<i32> {
    let value = parse_json("value", &args.value)?;
    let client = session.connect()?;
    client
        .set_system_variable(&args.name, value)
        .map_err(|err| client_error("setSystemVariable failed", err))?;
    Ok(SUCCESS)
}

pub fn delete(args: DeleteArgs, session: &Session) -> CliResult<i32> {
    let client = session.connect()?;
    client
        .delete_system_variable(&args.name)
        .map_err(|err| client_error("deleteSystemVariable failed", err))?;
    Ok(SUCCESS)
}

pub fn list(session: &Session) -> CliResult<i32> {
    let client = session.connect()?;
    let vars = client
        .get_all_system_variables()
        .map_err(|err| client_error("getAllSystemVariables failed", err))?;
    print_variables(&vars, session.format);
    Ok(SUCCESS)
}
