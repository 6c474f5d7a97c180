//! The source-level controller: line↔address queries, scoped variables,
//! live variable locations and value rendering, and source-level stepping.
//! Sits on top of the native controller and the debug-info model; performs
//! no writes of its own.

pub mod die;
pub mod line_map;
pub mod location;
pub mod parser;
pub mod source_file;
pub mod types;

use crate::error::{DebuggerError, Result};
use crate::event::DebugEvent;
use crate::native::Native;

use die::{DebugInfo, Variable};
use line_map::LineMap;
use location::{interpret, Location};
use parser::DebuggingInfo;
use source_file::SourceFile;
use tau_core::regs::float_reg_index;
use types::{PrimitiveKind, Type, TypeId};

/// The register anchoring frame-relative variable offsets.
const FRAME_BASE_REGISTER: &str = "BP";

#[derive(Debug, Default)]
pub struct Source {
    line_map: Option<LineMap>,
    info: Option<DebugInfo>,
    file: Option<SourceFile>,
}

impl Source {
    pub fn new(
        line_map: Option<LineMap>,
        info: Option<DebugInfo>,
        file: Option<SourceFile>,
    ) -> Source {
        Source {
            line_map,
            info,
            file,
        }
    }

    pub fn from_parsed(parsed: DebuggingInfo) -> Source {
        Source::new(parsed.line_map, parsed.info, parsed.source)
    }

    // ----- lines -----

    pub fn addr_to_line(&self, address: u64) -> Option<u64> {
        self.line_map.as_ref()?.line_for_addr(address)
    }

    /// The canonical (smallest) address of a line.
    pub fn line_to_addr(&self, line: u64) -> Option<u64> {
        self.line_map.as_ref()?.addr_for_line(line)
    }

    pub fn line(&self, idx: usize) -> Option<&str> {
        self.file.as_ref()?.line(idx)
    }

    pub fn lines(&self) -> &[String] {
        self.file.as_ref().map_or(&[], SourceFile::lines)
    }

    // ----- functions and variables -----

    /// Name and `[begin, end)` extent of the function covering `address`.
    pub fn function_info(&self, address: u64) -> Option<(&str, u64, u64)> {
        let f = self.info.as_ref()?.function_at(address)?;
        Some((f.name.as_str(), f.begin, f.end))
    }

    /// Variables visible at `address`, outer scopes first, shadowed names
    /// already resolved.
    pub fn scoped_variables(&self, address: u64) -> Vec<&Variable> {
        self.info
            .as_ref()
            .map_or_else(Vec::new, |info| info.scoped_variables(address))
    }

    pub fn variable(&self, address: u64, name: &str) -> Result<&Variable> {
        self.info
            .as_ref()
            .and_then(|info| info.variable_at(address, name))
            .ok_or_else(|| {
                DebuggerError::DebugInfoMissing(format!("no variable '{}' in scope", name))
            })
    }

    /// Runs the variable's location program against live registers.
    pub fn variable_location(
        &self,
        native: &mut Native,
        address: u64,
        name: &str,
    ) -> Result<Location> {
        let var = self.variable(address, name)?;
        if var.location.is_empty() {
            return Err(DebuggerError::DebugInfoMissing(format!(
                "no location recorded for variable '{}'",
                name
            )));
        }
        interpret(&var.location, native, FRAME_BASE_REGISTER)
    }

    pub fn variable_type(&self, address: u64, name: &str) -> Result<&Type> {
        let var = self.variable(address, name)?;
        let id = var.type_id.ok_or_else(|| {
            DebuggerError::DebugInfoMissing(format!("no type recorded for variable '{}'", name))
        })?;
        self.type_of(id)
    }

    pub fn type_of(&self, id: TypeId) -> Result<&Type> {
        self.info
            .as_ref()
            .and_then(|info| info.type_of(id))
            .ok_or_else(|| DebuggerError::DebugInfoMissing(format!("unknown type id {}", id)))
    }

    // ----- rendering -----

    pub fn type_to_string(&self, ty: &Type) -> String {
        match ty {
            Type::Primitive { kind, .. } => kind.to_string(),
            Type::Pointer { pointee, .. } => match self.type_of(*pointee) {
                Ok(inner) => format!("{}*", self.type_to_string(inner)),
                Err(_) => "?*".to_string(),
            },
            Type::Array { element, count } => match self.type_of(*element) {
                Ok(inner) => format!("{}[{}]", self.type_to_string(inner), count),
                Err(_) => format!("?[{}]", count),
            },
            Type::Structured { name, .. } => name.clone(),
        }
    }

    fn type_size(&self, ty: &Type) -> Result<u64> {
        match ty {
            Type::Primitive { size, .. } | Type::Pointer { size, .. } => Ok(*size),
            Type::Array { element, count } => {
                Ok(self.type_size(self.type_of(*element)?)? * count)
            }
            Type::Structured { size, .. } => Ok(*size),
        }
    }

    /// Renders the value at `loc` according to `ty`. Aggregates are read
    /// member-by-member from memory; a register-located aggregate cannot be
    /// rendered.
    pub fn typed_value_to_string(
        &self,
        native: &mut Native,
        loc: &Location,
        ty: &Type,
    ) -> Result<String> {
        match ty {
            Type::Primitive { kind, .. } => match kind {
                PrimitiveKind::Float => {
                    let v = match loc {
                        Location::Register(name) if float_reg_index(name).is_some() => {
                            native.get_float_register(name)?
                        }
                        _ => f64::from_bits(self.value_at(native, loc)? as u64),
                    };
                    Ok(v.to_string())
                }
                PrimitiveKind::Int => Ok(self.value_at(native, loc)?.to_string()),
                PrimitiveKind::Unsigned => {
                    Ok((self.value_at(native, loc)? as u64).to_string())
                }
                PrimitiveKind::Char => {
                    let v = self.value_at(native, loc)?;
                    Ok(format!("'{}'", (v as u8) as char))
                }
            },
            Type::Pointer { .. } => Ok(self.value_at(native, loc)?.to_string()),
            Type::Array { element, count } => {
                let base = memory_base(loc, "array")?;
                let element = self.type_of(*element)?;
                let stride = self.type_size(element)? as i64;
                let mut parts = Vec::new();
                for i in 0..*count {
                    let at = Location::Offset(base + i as i64 * stride);
                    parts.push(self.typed_value_to_string(native, &at, element)?);
                }
                Ok(format!("[{}]", parts.join(", ")))
            }
            Type::Structured { members, .. } => {
                let base = memory_base(loc, "struct")?;
                let mut parts = Vec::new();
                for member in members {
                    let ty = self.type_of(member.type_id)?;
                    let at = Location::Offset(base + member.offset);
                    let value = self.typed_value_to_string(native, &at, ty)?;
                    parts.push(format!("{} = {}", member.name, value));
                }
                Ok(format!("{{ {} }}", parts.join(", ")))
            }
        }
    }

    fn value_at(&self, native: &mut Native, loc: &Location) -> Result<i64> {
        match loc {
            Location::Register(name) => native.get_register(name),
            Location::Offset(o) => {
                let address = u64::try_from(*o).map_err(|_| {
                    DebuggerError::InvalidOperand(format!("negative memory address {}", o))
                })?;
                Ok(native.read_memory(address, 1)?[0])
            }
        }
    }

    // ----- source-level stepping -----

    /// Steps instructions until the IP lands on a different source line.
    /// Stepping into a call with no line information keeps going; any event
    /// other than a plain step is returned as-is.
    pub fn step_in(&self, native: &mut Native) -> Result<DebugEvent> {
        let start = self.addr_to_line(native.get_ip()?);
        loop {
            let event = native.single_step()?;
            if event != DebugEvent::Singlestep {
                return Ok(event);
            }
            if let Some(line) = self.addr_to_line(native.get_ip()?) {
                if start != Some(line) {
                    return Ok(DebugEvent::Singlestep);
                }
            }
        }
    }

    /// Like `step_in`, but calls count as a single step: the native layer
    /// runs each call site to its return address.
    pub fn step_over(&self, native: &mut Native) -> Result<DebugEvent> {
        let start = self.addr_to_line(native.get_ip()?);
        loop {
            let event = native.step_over(true)?;
            if event != DebugEvent::Singlestep {
                return Ok(event);
            }
            if let Some(line) = self.addr_to_line(native.get_ip()?) {
                if start != Some(line) {
                    return Ok(DebugEvent::Singlestep);
                }
            }
        }
    }

    /// Leaves the current function. Presentation (line or raw instruction)
    /// is the caller's concern.
    pub fn step_out(&self, native: &mut Native) -> Result<DebugEvent> {
        native.step_out()
    }
}

fn memory_base(loc: &Location, what: &str) -> Result<i64> {
    match loc {
        Location::Offset(o) => Ok(*o),
        Location::Register(name) => Err(DebuggerError::DebugInfoMissing(format!(
            "{} variable lives in register {} and cannot be read from memory",
            what, name
        ))),
    }
}
