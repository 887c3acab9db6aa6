//! The records the publisher sends.

use server::model::{Email, Employee};

pub fn sample_employee() -> Employee {
    Employee::new("exampleName", "10001")
}

pub fn sample_email() -> Email {
    Email::new("info@example.com", "Hello")
}

/// `count` copies of the sample employee; ids count up from 10001.
pub fn employees(count: usize) -> Vec<Employee> {
    let name = sample_employee().name;
    (0..count)
        .map(|i| Employee::new(name.clone(), (10001 + i).to_string()))
        .collect()
}

pub fn emails(count: usize) -> Vec<Email> {
    vec![sample_email(); count]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_employee_is_the_sample() {
        let records = employees(3);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0], sample_employee());
        assert_eq!(records[2].id, "10003");
    }

    #[test]
    fn test_zero_count_is_empty() {
        assert!(employees(0).is_empty());
        assert!(emails(0).is_empty());
    }
}
