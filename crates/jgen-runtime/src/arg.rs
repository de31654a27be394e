use std::fmt::Display;

/// Runtime value of a rule parameter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Arg {
    Int(i64),
    Name(&'static str),
}

impl Arg {
    /// The integer value, a symbolic argument here means the grammar mixed up its parameters.
    #[track_caller]
    pub fn int(self) -> i64 {
        match self {
            Arg::Int(value) => value,
            Arg::Name(name) => panic!("Expected an integer argument, got `{name}`"),
        }
    }

    pub fn name(self) -> Option<&'static str> {
        match self {
            Arg::Int(_) => None,
            Arg::Name(name) => Some(name),
        }
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Int(value) => write!(f, "{value}"),
            Arg::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Arg {
        Arg::Int(value)
    }
}

impl From<&'static str> for Arg {
    fn from(value: &'static str) -> Arg {
        Arg::Name(value)
    }
}

/// Called by generated `(case)` dispatch when no label matches and the
/// grammar was compiled with the `panic` policy.
#[track_caller]
pub fn unmatched_case(rule: &str, variable: &str, value: Arg) -> ! {
    panic!("Rule `{rule}` has no case for {variable} = {value}")
}

#[test]
fn test_arg_accessors() {
    assert_eq!(Arg::from(3i64).int(), 3);
    assert_eq!(Arg::from("block-in").name(), Some("block-in"));
    assert_eq!(Arg::Int(-1).name(), None);
    assert_eq!(Arg::Name("flow-out").to_string(), "flow-out");
}

#[test]
#[should_panic(expected = "Expected an integer argument")]
fn test_arg_int_on_name() {
    Arg::Name("block-in").int();
}

#[test]
#[should_panic(expected = "has no case for c = flow-key")]
fn test_unmatched_case() {
    unmatched_case("s-separate", "c", Arg::Name("flow-key"));
}
