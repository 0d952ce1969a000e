//! Names of symbolic memory slots.
//!
//! Every slot the executor reads or writes has a textual address, and a
//! value read from a slot nobody wrote is a free variable named after it.
//! Path conditions therefore mention addresses, and the formula compiler
//! parses them back to find out what a variable stands for.
//!
//! An address is a root followed by suffixes, joined by `:`.
//!
//! | Root                      | Meaning                               |
//! |---------------------------|---------------------------------------|
//! | `frame:D:local:NAME`      | a local of the frame at depth D       |
//! | `frame:D:arg:K`           | the K-th formal parameter             |
//! | `frame:D:this`            | the receiver                          |
//! | `frame:D:stack:NAME`      | an evaluation stack slot              |
//! | `staticfield:T.F`         | a static field                        |
//! | `symcall:ID`              | the result of a summarized call       |
//! | `special:NAME`            | engine state the configuration names |
//! | `heap:K`                  | an object allocated during execution  |
//!
//! Suffixes are `instancefield:F`, `length` and `heapid`. A reference value
//! read from slot `A` is the variable `A:heapid`, and its fields live at
//! `A:instancefield:F`.

use crate::il;
use crate::Error;
use std::fmt;

/// The slot of a frame an address starts from.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FrameSlot {
    Local(String),
    Argument(usize),
    This,
    Stack(String),
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Root {
    Frame { depth: usize, slot: FrameSlot },
    StaticField(String),
    Symcall(usize),
    Special(String),
    Heap(usize),
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Suffix {
    InstanceField(String),
    Length,
    HeapId,
}

/// A parsed address.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Address {
    root: Root,
    suffixes: Vec<Suffix>,
}

impl Address {
    pub fn new(root: Root) -> Address {
        Address {
            root,
            suffixes: Vec::new(),
        }
    }

    /// The slot holding `variable` in the frame at `depth`.
    pub fn variable(depth: usize, variable: &il::Variable) -> Address {
        let slot = match variable.kind() {
            il::VariableKind::Local => FrameSlot::Local(variable.name().to_string()),
            il::VariableKind::Parameter(index) => FrameSlot::Argument(index),
            il::VariableKind::This => FrameSlot::This,
            il::VariableKind::StackSlot => FrameSlot::Stack(variable.name().to_string()),
        };
        Address::new(Root::Frame { depth, slot })
    }

    pub fn argument(depth: usize, index: usize) -> Address {
        Address::new(Root::Frame {
            depth,
            slot: FrameSlot::Argument(index),
        })
    }

    pub fn this(depth: usize) -> Address {
        Address::new(Root::Frame {
            depth,
            slot: FrameSlot::This,
        })
    }

    pub fn static_field(field: &il::FieldRef) -> Address {
        Address::new(Root::StaticField(field.signature()))
    }

    pub fn symcall(id: usize) -> Address {
        Address::new(Root::Symcall(id))
    }

    pub fn special<S: Into<String>>(name: S) -> Address {
        Address::new(Root::Special(name.into()))
    }

    pub fn heap(id: usize) -> Address {
        Address::new(Root::Heap(id))
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn suffixes(&self) -> &[Suffix] {
        &self.suffixes
    }

    fn with(&self, suffix: Suffix) -> Address {
        let mut address = self.clone();
        address.suffixes.push(suffix);
        address
    }

    pub fn instance_field(&self, name: &str) -> Address {
        self.with(Suffix::InstanceField(name.to_string()))
    }

    pub fn length(&self) -> Address {
        self.with(Suffix::Length)
    }

    pub fn heap_id(&self) -> Address {
        self.with(Suffix::HeapId)
    }

    /// This address without a trailing `heapid`, the object a reference
    /// value points to.
    pub fn object(&self) -> Option<Address> {
        match self.suffixes.last() {
            Some(Suffix::HeapId) => {
                let mut address = self.clone();
                address.suffixes.pop();
                Some(address)
            }
            _ => None,
        }
    }

    /// The prefix shared by every address of the frame at `depth`.
    pub fn frame_prefix(depth: usize) -> String {
        format!("frame:{}:", depth)
    }

    pub fn parse(text: &str) -> Result<Address, Error> {
        let invalid = || Error::Parse(format!("invalid address {}", text));
        let segments: Vec<&str> = text.split(':').collect();
        let number = |segment: Option<&&str>| -> Result<usize, Error> {
            segment
                .and_then(|segment| segment.parse::<usize>().ok())
                .ok_or_else(invalid)
        };

        let (root, mut position) = match segments.first().copied() {
            Some("frame") => {
                let depth = number(segments.get(1))?;
                match segments.get(2).copied() {
                    Some("local") => {
                        let name = segments.get(3).ok_or_else(invalid)?;
                        let slot = FrameSlot::Local(name.to_string());
                        (Root::Frame { depth, slot }, 4)
                    }
                    Some("stack") => {
                        let name = segments.get(3).ok_or_else(invalid)?;
                        let slot = FrameSlot::Stack(name.to_string());
                        (Root::Frame { depth, slot }, 4)
                    }
                    Some("arg") => {
                        let slot = FrameSlot::Argument(number(segments.get(3))?);
                        (Root::Frame { depth, slot }, 4)
                    }
                    Some("this") => (
                        Root::Frame {
                            depth,
                            slot: FrameSlot::This,
                        },
                        3,
                    ),
                    _ => return Err(invalid()),
                }
            }
            Some("staticfield") => {
                let field = segments.get(1).ok_or_else(invalid)?;
                (Root::StaticField(field.to_string()), 2)
            }
            Some("symcall") => (Root::Symcall(number(segments.get(1))?), 2),
            Some("special") => {
                let name = segments.get(1).ok_or_else(invalid)?;
                (Root::Special(name.to_string()), 2)
            }
            Some("heap") => (Root::Heap(number(segments.get(1))?), 2),
            _ => return Err(invalid()),
        };

        let mut suffixes = Vec::new();
        while position < segments.len() {
            match segments[position] {
                "instancefield" => {
                    let name = segments.get(position + 1).ok_or_else(invalid)?;
                    suffixes.push(Suffix::InstanceField(name.to_string()));
                    position += 2;
                }
                "length" => {
                    suffixes.push(Suffix::Length);
                    position += 1;
                }
                "heapid" => {
                    suffixes.push(Suffix::HeapId);
                    position += 1;
                }
                _ => return Err(invalid()),
            }
        }

        Ok(Address { root, suffixes })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.root {
            Root::Frame { depth, slot } => {
                write!(f, "frame:{}:", depth)?;
                match slot {
                    FrameSlot::Local(name) => write!(f, "local:{}", name)?,
                    FrameSlot::Argument(index) => write!(f, "arg:{}", index)?,
                    FrameSlot::This => write!(f, "this")?,
                    FrameSlot::Stack(name) => write!(f, "stack:{}", name)?,
                }
            }
            Root::StaticField(field) => write!(f, "staticfield:{}", field)?,
            Root::Symcall(id) => write!(f, "symcall:{}", id)?,
            Root::Special(name) => write!(f, "special:{}", name)?,
            Root::Heap(id) => write!(f, "heap:{}", id)?,
        }
        for suffix in &self.suffixes {
            match suffix {
                Suffix::InstanceField(name) => write!(f, ":instancefield:{}", name)?,
                Suffix::Length => write!(f, ":length")?,
                Suffix::HeapId => write!(f, ":heapid")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_parse_back() {
        let this = il::Variable::this(il::Type::object("Game.Player"));
        let address = Address::variable(0, &this)
            .heap_id()
            .object()
            .unwrap()
            .instance_field("speed");
        assert_eq!(address.to_string(), "frame:0:this:instancefield:speed");

        for text in [
            "frame:0:this:instancefield:speed",
            "frame:2:local:count",
            "frame:1:arg:0:length",
            "staticfield:Game.Settings.instance:instancefield:volume:heapid",
            "symcall:3:instancefield:x",
            "special:instancemousewasdown",
            "heap:1:instancefield:next",
        ] {
            assert_eq!(Address::parse(text).unwrap().to_string(), text);
        }

        assert_eq!(
            Address::parse("symcall:4:heapid").unwrap().root(),
            &Root::Symcall(4)
        );
        assert!(Address::parse("frame:x:this").is_err());
        assert!(Address::parse("global:x").is_err());
        assert!(Address::parse("symcall:1:bogus").is_err());
    }
}
