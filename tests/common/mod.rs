//! Entity types shared by the integration suites.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use flatdb::{Entity, FieldDef, Result, StoreError, Values};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub age: i32,
}

impl User {
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            age,
        }
    }
}

impl Entity for User {
    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::text("name", 50), FieldDef::int4("age")]
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn write_values(&self, out: &mut Values) {
        out.push_text(self.name.clone()).push_int4(self.age);
    }

    fn read_values(id: i32, values: &mut Values) -> Result<Self> {
        Ok(Self {
            id,
            name: values.take_text()?,
            age: values.take_int4()?,
        })
    }
}

/// Minimal record with a five-byte name, for truncation behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: i32,
    pub title: String,
}

impl Entity for Note {
    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::text("title", 5)]
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn write_values(&self, out: &mut Values) {
        out.push_text(self.title.clone());
    }

    fn read_values(id: i32, values: &mut Values) -> Result<Self> {
        Ok(Self {
            id,
            title: values.take_text()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

impl Priority {
    fn from_i32(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::High),
            other => Err(StoreError::Codec(format!(
                "invalid priority discriminant {}",
                other
            ))),
        }
    }
}

/// Exercises every supported field kind, nullable and not.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i32,
    pub done: bool,
    pub budget: Decimal,
    pub due: DateTime<Utc>,
    pub priority: Priority,
    pub label: Option<String>,
    pub estimate: Option<i32>,
}

impl Entity for Task {
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::boolean("done"),
            FieldDef::decimal("budget"),
            FieldDef::datetime("due"),
            FieldDef::enumeration("priority"),
            FieldDef::text("label", 20).nullable(),
            FieldDef::int4("estimate").nullable(),
        ]
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn write_values(&self, out: &mut Values) {
        out.push_bool(self.done)
            .push_decimal(self.budget)
            .push_datetime(self.due)
            .push_enum(self.priority as i32)
            .push_opt_text(self.label.clone())
            .push_opt_int4(self.estimate);
    }

    fn read_values(id: i32, values: &mut Values) -> Result<Self> {
        Ok(Self {
            id,
            done: values.take_bool()?,
            budget: values.take_decimal()?,
            due: values.take_datetime()?,
            priority: Priority::from_i32(values.take_enum()?)?,
            label: values.take_opt_text()?,
            estimate: values.take_opt_int4()?,
        })
    }
}
