use rpoco::{ConnectionConfig, Database, Record, Subquery};

#[derive(Record, Debug, Clone, Default)]
#[table(name = "Employees")]
#[primary_key(name = "EmployeeId", sequence = "employees_employeeid_seq")]
struct Employee {
    #[column(name = "EmployeeId")]
    pub employee_id: i32,
    #[column(name = "FirstName")]
    pub first_name: String,
    #[column(name = "CountryId")]
    pub country_id: String,
    #[column(name = "HireDate")]
    pub hire_date: chrono::NaiveDateTime,
}

#[derive(Record, Debug, Clone, Default)]
#[table(name = "Countries")]
#[primary_key(name = "CountryId", auto_increment = false)]
struct Country {
    #[column(name = "CountryId")]
    pub country_id: String,
    #[column(name = "Name")]
    pub name: String,
}

async fn db() -> anyhow::Result<Database> {
    // RPOCO_DATABASE__* variables override the file
    let config = ConnectionConfig::load("tests/it_pg.yaml")?;
    Database::connect(&config).await
}

#[tokio::test]
#[ignore]
async fn it_pg_select_chain() -> anyhow::Result<()> {
    let db = db().await?;

    let mexican = Subquery::<Country>::select(Country::country_id)
        .filter(Country::name.eq("Mexico"));
    let list = db
        .get_where(Employee::country_id.in_query(mexican))
        .order_by_desc(Employee::hire_date)
        .take(1)
        .to_list_async()
        .await?;

    assert_eq!(list.len(), 1);
    assert_eq!(list[0].first_name, "Ana");

    Ok(())
}

#[tokio::test]
#[ignore]
async fn it_pg_insert_returns_sequence_key() -> anyhow::Result<()> {
    let db = db().await?;

    let emp = Employee {
        first_name: "Seq".into(),
        country_id: "USA".into(),
        ..Employee::default()
    };
    let id: i32 = db.add_returning_key_async(&emp).await?;
    assert!(id > 0);

    let removed = db
        .delete_where_async(Employee::employee_id.eq(id))
        .await?;
    assert_eq!(removed, 1);
    Ok(())
}
