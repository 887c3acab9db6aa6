use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A record that can travel as a message body.
///
/// `TYPE_ID` is written next to the record's fields so a receiver can tell
/// which record shape it got before decoding it.
pub trait Payload:
    Serialize + DeserializeOwned + fmt::Display + fmt::Debug + Send + Sync + 'static
{
    const TYPE_ID: &'static str;
}

/// A newly hired employee announcement.
///
/// # Examples
///
/// ```no_run
/// use server::model::Employee;
///
/// let employee = Employee::new("exampleName", "10001");
/// assert_eq!(
///     employee.to_string(),
///     "Welcome our new employee! {Name: exampleName, Id: 10001}"
/// );
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Employee {
    pub name: String,
    pub id: String,
}

impl Employee {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Employee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Welcome our new employee! {{Name: {}, Id: {}}}",
            self.name, self.id
        )
    }
}

impl Payload for Employee {
    const TYPE_ID: &'static str = "Employee";
}

/// An email notification.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Email {
    pub address: String,
    pub subject: String,
}

impl Email {
    pub fn new(address: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            subject: subject.into(),
        }
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Email{{address={}, subject={}}}",
            self.address, self.subject
        )
    }
}

impl Payload for Email {
    const TYPE_ID: &'static str = "Email";
}
