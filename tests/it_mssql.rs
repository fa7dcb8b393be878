use chrono::{NaiveDate, NaiveDateTime};
use rpoco::{ConnectionConfig, Database, DbKind, Record};

#[derive(Record, Debug, Clone, Default)]
#[table(name = "Employees")]
#[primary_key(name = "EmployeeId", auto_increment = false)]
struct Employee {
    #[column(name = "EmployeeId")]
    pub employee_id: i32,
    #[column(name = "FirstName")]
    pub first_name: String,
    #[column(name = "CountryId")]
    pub country_id: String,
    #[column(name = "HireDate")]
    pub hire_date: NaiveDateTime,
}

fn hired() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

async fn db() -> anyhow::Result<Database> {
    let config = ConnectionConfig {
        kind: DbKind::Mssql,
        host: "localhost".into(),
        port: Some(1433),
        database: "tempdb".into(),
        user: "sa".into(),
        password: "YourStrong!Passw0rd".into(),
        trust_cert: true,
    };
    Database::connect(&config).await
}

#[tokio::test]
#[ignore]
async fn it_mssql_select() -> anyhow::Result<()> {
    let db = db().await?;

    let list = db
        .get_where(Employee::country_id.eq("Mex"))
        .order_by_desc(Employee::hire_date)
        .take(10)
        .to_list_async()
        .await?;

    assert_eq!(list.len(), 1);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn it_mssql_insert() -> anyhow::Result<()> {
    let db = db().await?;

    let new_emp = Employee {
        employee_id: 2,
        first_name: "Ana".into(),
        country_id: "USA".into(),
        hire_date: hired(),
    };
    assert!(db.add_async(&new_emp).await?);

    let inserted = db
        .get_where(Employee::employee_id.eq(2))
        .first_async()
        .await?
        .unwrap();
    assert_eq!(inserted.first_name, "Ana");

    db.remove_async(&new_emp).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn it_mssql_update() -> anyhow::Result<()> {
    let db = db().await?;

    let base = Employee {
        employee_id: 3,
        first_name: "Ana".into(),
        country_id: "USA".into(),
        hire_date: hired(),
    };
    db.add_async(&base).await?;

    let upd = Employee {
        first_name: "Ann".into(),
        ..base.clone()
    };
    assert!(db.update_async(&upd).await?);

    db.set::<Employee>()
        .set(Employee::country_id, "Mex")
        .filter(Employee::employee_id.eq(3))
        .execute_async()
        .await?;

    let updated = db
        .get_where(Employee::employee_id.eq(3))
        .first_async()
        .await?
        .unwrap();
    assert_eq!(updated.first_name, "Ann");
    assert_eq!(updated.country_id, "Mex");

    db.remove_async(&base).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn it_mssql_delete() -> anyhow::Result<()> {
    let db = db().await?;

    let emp = Employee {
        employee_id: 4,
        first_name: "Bob".into(),
        country_id: "USA".into(),
        hire_date: hired(),
    };
    db.add_async(&emp).await?;

    let removed = db
        .delete_where_async(Employee::employee_id.eq(4))
        .await?;
    assert_eq!(removed, 1);
    let none = db
        .get_where(Employee::employee_id.eq(4))
        .count_async()
        .await?;
    assert_eq!(none, 0);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn it_mssql_transaction_rolls_back() -> anyhow::Result<()> {
    let db = db().await?;

    let emp = Employee {
        employee_id: 5,
        first_name: "Eve".into(),
        country_id: "USA".into(),
        hire_date: hired(),
    };
    let committed = db
        .transaction()
        .run_if_async(|| async {
            db.add_async(&emp).await?;
            Ok::<_, anyhow::Error>(false)
        })
        .await;
    assert!(!committed);

    let count = db
        .get_where(Employee::employee_id.eq(5))
        .count_async()
        .await?;
    assert_eq!(count, 0);
    Ok(())
}
