//! Looking into class files written by the compiler under test

use thiserror::Error;

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InspectError {
    #[error("class file truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("not a class file (magic {magic:#010x})")]
    BadMagic { magic: u32 },

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstant { tag: u8, index: u16 },

    #[error("constant pool index {index} is not a UTF-8 entry")]
    NotUtf8 { index: u16 },
}

pub trait BytecodeInspector {
    /// Human-readable listing of a class file
    fn disassemble(&self, bytes: &[u8]) -> Result<String, InspectError>;

    /// Declared method names, in declaration order
    fn method_names(&self, bytes: &[u8]) -> Result<Vec<String>, InspectError>;
}

/// Reads the constant pool and member tables; no code attributes
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassFileInspector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSummary {
    pub major: u16,
    pub minor: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
}

enum Constant {
    Utf8(String),
    Class(u16),
    Other,
    /// Second slot of a long or double
    Unusable,
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], InspectError> {
        let end = self.offset + len;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(InspectError::Truncated { offset: self.offset })?;
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, InspectError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, InspectError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, InspectError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip_attributes(&mut self) -> Result<(), InspectError> {
        for _ in 0..self.u16()? {
            self.u16()?;
            let len = self.u32()? as usize;
            self.take(len)?;
        }
        Ok(())
    }
}

struct ConstantPool(Vec<Constant>);

impl ConstantPool {
    fn read(reader: &mut Reader<'_>) -> Result<Self, InspectError> {
        let count = reader.u16()?;
        let mut entries = vec![Constant::Unusable];
        let mut index = 1;
        while index < count {
            let tag = reader.u8()?;
            let constant = match tag {
                1 => {
                    let len = reader.u16()? as usize;
                    Constant::Utf8(String::from_utf8_lossy(reader.take(len)?).into_owned())
                }
                7 => Constant::Class(reader.u16()?),
                8 | 16 | 19 | 20 => {
                    reader.take(2)?;
                    Constant::Other
                }
                15 => {
                    reader.take(3)?;
                    Constant::Other
                }
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.take(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    reader.take(8)?;
                    entries.push(Constant::Other);
                    index += 1;
                    Constant::Unusable
                }
                _ => return Err(InspectError::UnknownConstant { tag, index }),
            };
            entries.push(constant);
            index += 1;
        }
        Ok(Self(entries))
    }

    fn utf8(&self, index: u16) -> Result<&str, InspectError> {
        match self.0.get(index as usize) {
            Some(Constant::Utf8(text)) => Ok(text),
            _ => Err(InspectError::NotUtf8 { index }),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, InspectError> {
        match self.0.get(index as usize) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(InspectError::NotUtf8 { index }),
        }
    }
}

fn read_members(reader: &mut Reader<'_>, pool: &ConstantPool) -> Result<Vec<Member>, InspectError> {
    let count = reader.u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access = reader.u16()?;
        let name = pool.utf8(reader.u16()?)?.to_string();
        let descriptor = pool.utf8(reader.u16()?)?.to_string();
        reader.skip_attributes()?;
        members.push(Member {
            access,
            name,
            descriptor,
        });
    }
    Ok(members)
}

impl ClassFileInspector {
    pub fn summarize(&self, bytes: &[u8]) -> Result<ClassSummary, InspectError> {
        let mut reader = Reader { bytes, offset: 0 };
        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(InspectError::BadMagic { magic });
        }
        let minor = reader.u16()?;
        let major = reader.u16()?;
        let pool = ConstantPool::read(&mut reader)?;
        reader.u16()?;
        let this_class = pool.class_name(reader.u16()?)?.to_string();
        let super_class = match reader.u16()? {
            0 => None,
            index => Some(pool.class_name(index)?.to_string()),
        };
        let interfaces = reader.u16()? as usize;
        reader.take(interfaces * 2)?;
        let fields = read_members(&mut reader, &pool)?;
        let methods = read_members(&mut reader, &pool)?;
        Ok(ClassSummary {
            major,
            minor,
            this_class,
            super_class,
            fields,
            methods,
        })
    }
}

impl BytecodeInspector for ClassFileInspector {
    fn disassemble(&self, bytes: &[u8]) -> Result<String, InspectError> {
        let summary = self.summarize(bytes)?;
        let mut text = format!(
            "class {} (version {}.{})\n",
            summary.this_class, summary.major, summary.minor
        );
        if let Some(super_class) = &summary.super_class {
            text.push_str(&format!("  extends {super_class}\n"));
        }
        for field in &summary.fields {
            text.push_str(&format!("  field {} {}\n", field.name, field.descriptor));
        }
        for method in &summary.methods {
            text.push_str(&format!("  method {}{}\n", method.name, method.descriptor));
        }
        Ok(text)
    }

    fn method_names(&self, bytes: &[u8]) -> Result<Vec<String>, InspectError> {
        Ok(self
            .summarize(bytes)?
            .methods
            .into_iter()
            .map(|m| m.name)
            .collect())
    }
}
