macro_rules! u8_enum {
    ($vis:vis enum $name:ident { $($variant:ident = $val:expr),* $(,)? }) => {
        #[derive(Debug, Copy, Clone, Eq, PartialEq)]
        $vis enum $name {
            $($variant = $val,)*
        }

        impl core::convert::TryFrom<u8> for $name {
            type Error = InvalidEnumValue;

            fn try_from(val: u8) -> Result<Self, Self::Error> {
                match val {
                    $($val => Ok($name::$variant),)*
                    _ => Err(InvalidEnumValue(val))
                }
            }
        }
    }
}

u8_enum! {
    pub enum StateId {
        Association = 0,
    }
}

u8_enum! {
    pub enum EventKind {
        MemberAdded = 0,
        MemberRemoved = 1,
        SaveAdded = 2,
        GivenLoan = 3,
        LoanRepaid = 4,
        PayoutMade = 5,
    }
}

impl EventKind {
    /// The name the event is published under.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::MemberAdded => "MemberAdded",
            EventKind::MemberRemoved => "MemberRemoved",
            EventKind::SaveAdded => "SaveAdded",
            EventKind::GivenLoan => "GivenLoan",
            EventKind::LoanRepaid => "LoanRepaid",
            EventKind::PayoutMade => "PayoutMade",
        }
    }
}

#[derive(Debug)]
pub struct InvalidEnumValue(pub u8);
