//! Synthetic time-clock exports shared by the integration tests

#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Punch CSV where Mondays are absences, Fridays are late arrivals and every
/// other weekday is on time
pub fn punch_csv(employees: usize, weekdays: usize) -> String {
    let mut text = String::from(
        "employee_id,nombre_empleado,fecha,hora_entrada_teorica,hora_entrada_real,hora_salida_teorica,hora_salida_real,ausencia\n",
    );

    let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    for employee in 0..employees {
        let mut day = start;
        let mut emitted = 0;
        while emitted < weekdays {
            if day.weekday() != Weekday::Sat && day.weekday() != Weekday::Sun {
                let date = day.format("%d/%m/%Y");
                let line = match day.weekday() {
                    Weekday::Mon => format!(
                        "{id},Empleado {id},{date},08:00,,17:00,,Ausente Injustificado\n",
                        id = 100 + employee
                    ),
                    Weekday::Fri => format!(
                        "{id},Empleado {id},{date},08:00,08:{late},17:00,17:05,Tardanza\n",
                        id = 100 + employee,
                        late = 20 + (employee % 5) * 5
                    ),
                    _ => format!(
                        "{id},Empleado {id},{date},08:00,07:5{m},17:00,17:00,\n",
                        id = 100 + employee,
                        m = employee % 10
                    ),
                };
                text.push_str(&line);
                emitted += 1;
            }
            day += Duration::days(1);
        }
    }
    text
}

/// Same export with the `ausencia` column dropped
pub fn unlabeled_punch_csv(employees: usize, weekdays: usize) -> String {
    punch_csv(employees, weekdays)
        .lines()
        .map(|line| {
            let cut = line.rfind(',').unwrap_or(line.len());
            format!("{}\n", &line[..cut])
        })
        .collect()
}
