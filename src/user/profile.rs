//! Personal data collected on registration.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhoneKind {
    Mobile,
    Home,
    Work,
    Other,
}

/// Brazilian federative unit, serialized as its two-letter code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    Ac,
    Al,
    Ap,
    Am,
    Ba,
    Ce,
    Df,
    Es,
    Go,
    Ma,
    Mt,
    Ms,
    Mg,
    Pa,
    Pb,
    Pr,
    Pe,
    Pi,
    Rj,
    Rn,
    Rs,
    Ro,
    Rr,
    Sc,
    Sp,
    Se,
    To,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct Phone {
    #[serde(rename = "type")]
    pub kind: PhoneKind,
    #[validate(length(min = 1, max = 32, message = "Phone number must not be empty."))]
    pub number: String,
    /// Set by the platform once the number is verified.
    #[serde(default, skip_deserializing)]
    pub confirmed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub birth_date: NaiveDate,
    pub sex: Sex,
    #[serde(default)]
    #[validate(nested)]
    pub phones: Vec<Phone>,
    #[validate(length(min = 1, max = 255, message = "City must contain 1 to 255 characters."))]
    pub city: String,
    pub state: State,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let profile: Profile = serde_json::from_value(serde_json::json!({
            "birthDate": "1994-03-21",
            "sex": "Female",
            "phones": [{ "type": "Mobile", "number": "+55 11 91234-5678", "confirmed": true }],
            "city": "Campinas",
            "state": "SP",
        }))
        .unwrap();

        assert_eq!(profile.state, State::Sp);
        assert_eq!(profile.phones[0].kind, PhoneKind::Mobile);
        assert!(!profile.phones[0].confirmed);

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["birthDate"], "1994-03-21");
        assert_eq!(json["phones"][0]["type"], "Mobile");
        assert_eq!(json["state"], "SP");
    }

    #[test]
    fn test_closed_value_sets() {
        let parse = |sex: &str, state: &str| {
            serde_json::from_value::<Profile>(serde_json::json!({
                "birthDate": "1994-03-21",
                "sex": sex,
                "city": "Campinas",
                "state": state,
            }))
        };

        assert!(parse("Other", "TO").is_ok());
        assert!(parse("Unknown", "SP").is_err());
        assert!(parse("Male", "XX").is_err());
        assert!(parse("Male", "sp").is_err());
    }

    #[test]
    fn test_nested_validation() {
        let profile = Profile {
            birth_date: NaiveDate::from_ymd_opt(1994, 3, 21).unwrap(),
            sex: Sex::Male,
            phones: vec![Phone {
                kind: PhoneKind::Home,
                number: String::new(),
                confirmed: false,
            }],
            city: String::new(),
            state: State::Rj,
        };

        let errors = profile.validate().unwrap_err();
        assert!(errors.errors().contains_key("city"));
        assert!(errors.errors().contains_key("phones"));
    }
}
